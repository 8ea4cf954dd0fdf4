//! Self-driving automaton (SDA) genotype.
//!
//! An [`Sda`] is a fixed-size finite-state transducer. Each `(state, symbol)`
//! pair owns a target state and a short response string. Decoding starts from
//! the initial symbol and feeds the automaton its own output: a read cursor
//! trails the write cursor through a single buffer, so the output drives the
//! transitions that extend it.
//!
//! The decoded symbols are the phenotype. [`Topology`](crate::Topology) reads
//! them as the lower triangle of a network adjacency matrix.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use symbios_genetics::Genotype;

use crate::error::{FogError, Result};

/// Structural parameters and mutation probabilities of an SDA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdaConfig {
    /// Number of states.
    pub num_states: usize,
    /// Alphabet size. Symbols are in `[0, num_chars)`.
    pub num_chars: usize,
    /// Upper bound on the length of a single transition response.
    pub max_response_len: usize,
    /// Number of symbols produced by [`Sda::output`].
    pub output_len: usize,
    /// State the automaton starts decoding from.
    pub initial_state: usize,
    /// Probability that a mutation trial replaces the initial symbol.
    pub initial_symbol_mutation_prob: f64,
    /// Probability that a mutation trial replaces a transition target.
    /// The remaining mass replaces a response.
    pub transition_mutation_prob: f64,
}

impl Default for SdaConfig {
    fn default() -> Self {
        Self {
            num_states: 10,
            num_chars: 2,
            max_response_len: 2,
            output_len: 1000,
            initial_state: 0,
            initial_symbol_mutation_prob: 0.04,
            transition_mutation_prob: 0.48,
        }
    }
}

impl SdaConfig {
    /// Config for a binary alphabet with the given state count and output length.
    #[must_use]
    pub fn binary(num_states: usize, output_len: usize) -> Self {
        Self {
            num_states,
            output_len,
            ..Default::default()
        }
    }

    /// Check ranges. Every error names the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.num_states == 0 {
            return Err(FogError::config("num_states", "must be at least 1"));
        }
        if self.num_chars < 2 {
            return Err(FogError::config("num_chars", "must be at least 2"));
        }
        if self.max_response_len == 0 {
            return Err(FogError::config("max_response_len", "must be at least 1"));
        }
        if self.output_len == 0 {
            return Err(FogError::config("output_len", "must be at least 1"));
        }
        if self.initial_state >= self.num_states {
            return Err(FogError::config(
                "initial_state",
                format!("must be below num_states ({})", self.num_states),
            ));
        }
        let p_init = self.initial_symbol_mutation_prob;
        let p_trans = self.transition_mutation_prob;
        if !(0.0..=1.0).contains(&p_init) {
            return Err(FogError::config(
                "initial_symbol_mutation_prob",
                "must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&p_trans) || p_init + p_trans > 1.0 {
            return Err(FogError::config(
                "transition_mutation_prob",
                "must be within [0, 1 - initial_symbol_mutation_prob]",
            ));
        }
        Ok(())
    }
}

/// A self-driving automaton genotype.
///
/// Created empty by [`Sda::new`]; every operation other than
/// [`create`](Sda::create) fails with [`FogError::Uninitialized`] until the
/// tables are populated. [`Sda::random`] does both steps at once.
/// Deserialized genotypes are range-checked like
/// [`from_description`](Sda::from_description).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SdaRepr")]
pub struct Sda {
    num_states: usize,
    num_chars: usize,
    max_response_len: usize,
    output_len: usize,
    initial_state: usize,
    initial_symbol: Option<usize>,
    /// `transitions[state][symbol]` is the next state.
    transitions: Vec<Vec<usize>>,
    /// `responses[state][symbol]` is appended to the output.
    responses: Vec<Vec<Vec<usize>>>,
    initial_symbol_mutation_prob: f64,
    transition_mutation_prob: f64,
}

/// Unchecked serialized form of [`Sda`].
#[derive(Deserialize)]
struct SdaRepr {
    num_states: usize,
    num_chars: usize,
    max_response_len: usize,
    output_len: usize,
    initial_state: usize,
    initial_symbol: Option<usize>,
    transitions: Vec<Vec<usize>>,
    responses: Vec<Vec<Vec<usize>>>,
    initial_symbol_mutation_prob: f64,
    transition_mutation_prob: f64,
}

impl TryFrom<SdaRepr> for Sda {
    type Error = FogError;

    fn try_from(repr: SdaRepr) -> Result<Self> {
        let sda = Self {
            num_states: repr.num_states,
            num_chars: repr.num_chars,
            max_response_len: repr.max_response_len,
            output_len: repr.output_len,
            initial_state: repr.initial_state,
            initial_symbol: repr.initial_symbol,
            transitions: repr.transitions,
            responses: repr.responses,
            initial_symbol_mutation_prob: repr.initial_symbol_mutation_prob,
            transition_mutation_prob: repr.transition_mutation_prob,
        };
        sda.check_tables()?;
        Ok(sda)
    }
}

impl Sda {
    /// Create an uninitialized genotype with the given structure.
    #[must_use]
    pub fn new(config: &SdaConfig) -> Self {
        Self {
            num_states: config.num_states,
            num_chars: config.num_chars,
            max_response_len: config.max_response_len,
            output_len: config.output_len,
            initial_state: config.initial_state,
            initial_symbol: None,
            transitions: Vec::new(),
            responses: Vec::new(),
            initial_symbol_mutation_prob: config.initial_symbol_mutation_prob,
            transition_mutation_prob: config.transition_mutation_prob,
        }
    }

    /// Create and randomly initialize a genotype.
    #[must_use]
    pub fn random<R: Rng>(config: &SdaConfig, rng: &mut R) -> Self {
        let mut sda = Self::new(config);
        sda.create(rng);
        sda
    }

    /// Randomly populate the initial symbol, transitions and responses.
    pub fn create<R: Rng>(&mut self, rng: &mut R) {
        self.initial_symbol = Some(rng.random_range(0..self.num_chars));

        self.transitions = (0..self.num_states)
            .map(|_| {
                (0..self.num_chars)
                    .map(|_| rng.random_range(0..self.num_states))
                    .collect()
            })
            .collect();

        let mut responses = Vec::with_capacity(self.num_states);
        for _ in 0..self.num_states {
            let row: Vec<Vec<usize>> = (0..self.num_chars)
                .map(|_| self.random_response(rng))
                .collect();
            responses.push(row);
        }
        self.responses = responses;
    }

    /// Re-draw every table entry of an initialized genotype.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        self.ensure_initialized("randomize")?;
        self.create(rng);
        Ok(())
    }

    /// Whether [`create`](Self::create) or deserialization has populated the tables.
    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initial_symbol.is_some()
    }

    /// Number of states.
    #[must_use]
    pub const fn num_states(&self) -> usize {
        self.num_states
    }

    /// Alphabet size.
    #[must_use]
    pub const fn num_chars(&self) -> usize {
        self.num_chars
    }

    /// Longest allowed response.
    #[must_use]
    pub const fn max_response_len(&self) -> usize {
        self.max_response_len
    }

    /// Configured phenotype length.
    #[must_use]
    pub const fn output_len(&self) -> usize {
        self.output_len
    }

    /// Change the configured phenotype length.
    pub fn set_output_len(&mut self, output_len: usize) {
        self.output_len = output_len;
    }

    /// State decoding starts from.
    #[must_use]
    pub const fn initial_state(&self) -> usize {
        self.initial_state
    }

    /// First output symbol, `None` until created.
    #[must_use]
    pub const fn initial_symbol(&self) -> Option<usize> {
        self.initial_symbol
    }

    /// Transition table, indexed `[state][symbol]`.
    #[must_use]
    pub fn transitions(&self) -> &[Vec<usize>] {
        &self.transitions
    }

    /// Response table, indexed `[state][symbol]`.
    #[must_use]
    pub fn responses(&self) -> &[Vec<Vec<usize>>] {
        &self.responses
    }

    /// Decode exactly `output_len` symbols.
    ///
    /// The buffer is its own input: `read` trails `output.len()`. For every
    /// consumed symbol the response of `(state, symbol)` is appended (the
    /// last one truncated to fit) and the state follows the transition for
    /// that same symbol.
    pub fn decode(&self, output_len: usize) -> Result<Vec<usize>> {
        let initial_symbol = self.ensure_initialized("decode")?;
        let mut output = Vec::with_capacity(output_len);
        if output_len == 0 {
            return Ok(output);
        }

        output.push(initial_symbol);
        let mut state = self.initial_state;
        let mut read = 0;

        while output.len() < output_len {
            let symbol = *output.get(read).ok_or_else(|| {
                FogError::MalformedInput(format!("decode stalled after {read} symbols"))
            })?;
            let (target, response) = self.entry(state, symbol)?;
            for &value in response {
                if output.len() == output_len {
                    break;
                }
                output.push(value);
            }
            state = target;
            read += 1;
        }

        Ok(output)
    }

    /// Decode the configured `output_len` symbols.
    pub fn output(&self) -> Result<Vec<usize>> {
        self.decode(self.output_len)
    }

    /// Apply `num_mutations` independent mutation trials.
    ///
    /// Each trial replaces the initial symbol, one transition target, or one
    /// response, chosen by the configured probabilities. Targets are drawn
    /// uniformly and may repeat across trials.
    pub fn mutate_n<R: Rng>(&mut self, num_mutations: usize, rng: &mut R) -> Result<()> {
        self.ensure_initialized("mutate")?;

        for _ in 0..num_mutations {
            let roll = rng.random::<f64>();
            if roll < self.initial_symbol_mutation_prob {
                self.initial_symbol = Some(rng.random_range(0..self.num_chars));
                continue;
            }

            let state = rng.random_range(0..self.num_states);
            let symbol = rng.random_range(0..self.num_chars);
            if roll < self.initial_symbol_mutation_prob + self.transition_mutation_prob {
                self.transitions[state][symbol] = rng.random_range(0..self.num_states);
            } else {
                let response = self.random_response(rng);
                self.responses[state][symbol] = response;
            }
        }

        Ok(())
    }

    /// Two-point crossover with random cut points, in place on both genotypes.
    ///
    /// Returns the cut points `(start, end)` that were used.
    pub fn crossover_with<R: Rng>(&mut self, other: &mut Sda, rng: &mut R) -> Result<(usize, usize)> {
        self.check_compatible(other)?;

        let (start, end) = loop {
            let a = rng.random_range(0..=self.num_states);
            let b = rng.random_range(0..=self.num_states);
            if a != b {
                break (a.min(b), a.max(b));
            }
        };

        self.crossover_at(other, start, end)?;
        Ok((start, end))
    }

    /// Swap the rows of states `[start, end)` between `self` and `other`.
    ///
    /// When `start == 0` the initial symbols are swapped too. Applying the
    /// same cut points twice restores both genotypes.
    pub fn crossover_at(&mut self, other: &mut Sda, start: usize, end: usize) -> Result<()> {
        self.check_compatible(other)?;
        if start >= end || end > self.num_states {
            return Err(FogError::MalformedInput(format!(
                "crossover points [{start}, {end}) invalid for {} states",
                self.num_states
            )));
        }

        if start == 0 {
            std::mem::swap(&mut self.initial_symbol, &mut other.initial_symbol);
        }
        self.transitions[start..end].swap_with_slice(&mut other.transitions[start..end]);
        self.responses[start..end].swap_with_slice(&mut other.responses[start..end]);
        Ok(())
    }

    /// Deep-replace this genotype with `other`.
    pub fn copy_from(&mut self, other: &Sda) -> Result<()> {
        other.ensure_initialized("copy")?;
        self.clone_from(other);
        Ok(())
    }

    /// Parse the textual form produced by [`Display`](fmt::Display).
    ///
    /// The first line is `init_state <- init_symbol`; every other line is
    /// `state + symbol -> target [ r1 r2 ... ]`. All `(state, symbol)` pairs
    /// must be present.
    pub fn from_description(config: &SdaConfig, text: &str) -> Result<Self> {
        let mut sda = Self::new(config);
        let mut transitions: Vec<Vec<Option<usize>>> =
            vec![vec![None; config.num_chars]; config.num_states];
        let mut responses: Vec<Vec<Option<Vec<usize>>>> =
            vec![vec![None; config.num_chars]; config.num_states];

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some((state, symbol)) = line.split_once("<-") {
                let state = parse_bounded(state, config.num_states, line_no, "initial state")?;
                let symbol = parse_bounded(symbol, config.num_chars, line_no, "initial symbol")?;
                sda.initial_state = state;
                sda.initial_symbol = Some(symbol);
                continue;
            }

            let (lhs, rhs) = line
                .split_once("->")
                .ok_or_else(|| FogError::parse(line_no, "expected `->` or `<-`"))?;
            let (state, symbol) = lhs
                .split_once('+')
                .ok_or_else(|| FogError::parse(line_no, "expected `state + symbol`"))?;
            let state = parse_bounded(state, config.num_states, line_no, "state")?;
            let symbol = parse_bounded(symbol, config.num_chars, line_no, "symbol")?;

            let (target, response) = rhs
                .split_once('[')
                .ok_or_else(|| FogError::parse(line_no, "expected `[` before response"))?;
            let target = parse_bounded(target, config.num_states, line_no, "target state")?;
            let response = response
                .strip_suffix(']')
                .ok_or_else(|| FogError::parse(line_no, "expected closing `]`"))?;
            let response = response
                .split_whitespace()
                .map(|tok| parse_bounded(tok, config.num_chars, line_no, "response symbol"))
                .collect::<Result<Vec<_>>>()?;
            if response.is_empty() || response.len() > config.max_response_len {
                return Err(FogError::parse(
                    line_no,
                    format!(
                        "response length {} outside [1, {}]",
                        response.len(),
                        config.max_response_len
                    ),
                ));
            }

            transitions[state][symbol] = Some(target);
            responses[state][symbol] = Some(response);
        }

        if sda.initial_symbol.is_none() {
            return Err(FogError::parse(0, "missing `init_state <- init_symbol` line"));
        }

        sda.transitions = transitions
            .into_iter()
            .enumerate()
            .map(|(state, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(symbol, t)| t.ok_or_else(|| missing_entry(state, symbol)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        sda.responses = responses
            .into_iter()
            .enumerate()
            .map(|(state, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(symbol, r)| r.ok_or_else(|| missing_entry(state, symbol)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(sda)
    }

    /// Transition target and response of `(state, symbol)`.
    fn entry(&self, state: usize, symbol: usize) -> Result<(usize, &[usize])> {
        let target = self.transitions.get(state).and_then(|row| row.get(symbol));
        let response = self.responses.get(state).and_then(|row| row.get(symbol));
        match (target, response) {
            (Some(&target), Some(response)) => Ok((target, response.as_slice())),
            _ => Err(FogError::MalformedInput(format!(
                "no table entry for state {state}, symbol {symbol}"
            ))),
        }
    }

    /// Check structure and table contents against the declared ranges.
    fn check_tables(&self) -> Result<()> {
        let malformed = |reason: String| -> Result<()> { Err(FogError::MalformedInput(reason)) };
        if self.num_states == 0 || self.num_chars == 0 || self.max_response_len == 0 {
            return malformed(
                "num_states, num_chars and max_response_len must be positive".into(),
            );
        }
        if self.initial_state >= self.num_states {
            return malformed(format!(
                "initial state {} out of range 0..{}",
                self.initial_state, self.num_states
            ));
        }
        let p_init = self.initial_symbol_mutation_prob;
        let p_trans = self.transition_mutation_prob;
        if !(0.0..=1.0).contains(&p_init)
            || !(0.0..=1.0).contains(&p_trans)
            || p_init + p_trans > 1.0
        {
            return malformed("mutation probabilities must lie in [0, 1] and sum to at most 1".into());
        }

        let Some(initial_symbol) = self.initial_symbol else {
            if self.transitions.is_empty() && self.responses.is_empty() {
                return Ok(());
            }
            return malformed("tables present without an initial symbol".into());
        };
        if initial_symbol >= self.num_chars {
            return malformed(format!(
                "initial symbol {initial_symbol} out of range 0..{}",
                self.num_chars
            ));
        }
        if self.transitions.len() != self.num_states || self.responses.len() != self.num_states {
            return malformed(format!("tables must have {} state rows", self.num_states));
        }

        let rows = self.transitions.iter().zip(&self.responses);
        for (state, (targets, responses)) in rows.enumerate() {
            if targets.len() != self.num_chars || responses.len() != self.num_chars {
                return malformed(format!(
                    "state {state} must have {} symbol entries",
                    self.num_chars
                ));
            }
            for (symbol, (&target, response)) in targets.iter().zip(responses).enumerate() {
                if target >= self.num_states {
                    return malformed(format!(
                        "state {state} + {symbol} targets {target}, out of range 0..{}",
                        self.num_states
                    ));
                }
                if response.is_empty() || response.len() > self.max_response_len {
                    return malformed(format!(
                        "state {state} + {symbol} response length {} outside [1, {}]",
                        response.len(),
                        self.max_response_len
                    ));
                }
                if let Some(&bad) = response.iter().find(|&&c| c >= self.num_chars) {
                    return malformed(format!(
                        "state {state} + {symbol} response symbol {bad} out of range 0..{}",
                        self.num_chars
                    ));
                }
            }
        }
        Ok(())
    }

    fn random_response<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        let len = rng.random_range(1..=self.max_response_len);
        (0..len).map(|_| rng.random_range(0..self.num_chars)).collect()
    }

    fn ensure_initialized(&self, operation: &'static str) -> Result<usize> {
        self.initial_symbol
            .ok_or(FogError::Uninitialized { operation })
    }

    fn check_compatible(&self, other: &Sda) -> Result<()> {
        self.ensure_initialized("crossover")?;
        other.ensure_initialized("crossover")?;
        let pairs = [
            ("num_states", self.num_states, other.num_states),
            ("num_chars", self.num_chars, other.num_chars),
            ("max_response_len", self.max_response_len, other.max_response_len),
        ];
        for (parameter, left, right) in pairs {
            if left != right {
                return Err(FogError::IncompatibleGenotype {
                    parameter,
                    left,
                    right,
                });
            }
        }
        Ok(())
    }
}

fn parse_bounded(token: &str, bound: usize, line: usize, what: &str) -> Result<usize> {
    let value: usize = token
        .trim()
        .parse()
        .map_err(|_| FogError::parse(line, format!("invalid {what} `{}`", token.trim())))?;
    if value >= bound {
        return Err(FogError::parse(
            line,
            format!("{what} {value} out of range [0, {bound})"),
        ));
    }
    Ok(value)
}

fn missing_entry(state: usize, symbol: usize) -> FogError {
    FogError::parse(0, format!("missing entry for state {state}, symbol {symbol}"))
}

impl fmt::Display for Sda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(initial_symbol) = self.initial_symbol else {
            return write!(f, "<uninitialized SDA>");
        };
        writeln!(f, "{} <- {}", self.initial_state, initial_symbol)?;
        for (state, (targets, responses)) in
            self.transitions.iter().zip(&self.responses).enumerate()
        {
            for (symbol, (target, response)) in targets.iter().zip(responses).enumerate() {
                write!(f, "{state} + {symbol} -> {target} [")?;
                for value in response {
                    write!(f, " {value}")?;
                }
                writeln!(f, " ]")?;
            }
        }
        Ok(())
    }
}

/// Plugs the SDA into generic evolutionary tooling.
///
/// `mutate` performs a single trial with probability `rate`; `crossover`
/// returns the first child of a random two-point crossover. Uninitialized
/// genotypes are returned unchanged since the trait has no error channel.
impl Genotype for Sda {
    fn mutate<R: Rng>(&mut self, rng: &mut R, rate: f32) {
        if self.is_initialized() && rng.random::<f32>() < rate {
            let _ = self.mutate_n(1, rng);
        }
    }

    fn crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> Self {
        let mut child = self.clone();
        let mut partner = other.clone();
        if child.crossover_with(&mut partner, rng).is_err() {
            return self.clone();
        }
        child
    }
}
