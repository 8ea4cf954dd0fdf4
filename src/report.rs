//! Run summaries and the sinks they are written to.

use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fitness::FitnessEvaluator;
use crate::population::Population;
use crate::sda::Sda;
use crate::topology::{ConnectionMode, Topology};

/// Prefix of the per-generation fitness line.
pub const FITNESS_PREFIX: &str = "Fitness Values: ";
/// Prefix of the best phenotype line.
pub const BEST_LAYOUT_PREFIX: &str = "Best Layout: ";

/// The best member of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestMember {
    /// Best genotype.
    pub genotype: Sda,
    /// Its decoded connection vector.
    pub phenotype: Vec<usize>,
    /// Its fitness.
    pub fitness: f64,
}

/// Final summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Completed steps.
    pub generations: usize,
    /// Configured mutation rate.
    pub mutation_rate: f64,
    /// Best live member, if any is alive.
    pub best: Option<BestMember>,
    /// Mean over viable members only.
    pub average_fitness: Option<f64>,
    /// Members that passed the necrotic filter.
    pub live_members: usize,
    /// Number of population slots.
    pub pop_size: usize,
    /// Streams the best network failed to deliver.
    pub failed_streams: usize,
}

impl Report {
    /// Summarize `population`, replaying its best member on `topology` to
    /// count undelivered streams.
    pub fn build(
        population: &Population,
        topology: &mut Topology,
        fitness: &FitnessEvaluator,
        mutation_rate: f64,
        generations: usize,
    ) -> Result<Self> {
        let mut failed_streams = 0;
        let best = match population.best() {
            Some(member) => {
                let phenotype = member.genotype.output()?;
                topology.set_connections(&phenotype, ConnectionMode::Enforced)?;
                let score = fitness.score(topology);
                if !fitness.heuristic().needs_traffic() {
                    topology.distribute_traffic();
                }
                failed_streams = topology.failed_streams().len();
                Some(BestMember {
                    genotype: member.genotype.clone(),
                    phenotype,
                    fitness: member.vitality.fitness().unwrap_or(score),
                })
            }
            None => None,
        };

        Ok(Self {
            generations,
            mutation_rate,
            best,
            average_fitness: population.average_live_fitness(),
            live_members: population.live_count(),
            pop_size: population.len(),
            failed_streams,
        })
    }
}

/// `"Fitness Values: v1, v2, ..."`.
#[must_use]
pub fn fitness_line(values: &[f64]) -> String {
    let joined = values
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{FITNESS_PREFIX}{joined}")
}

fn phenotype_string(phenotype: &[usize]) -> String {
    phenotype
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generations: {}", self.generations)?;
        let percent = (self.mutation_rate * 100.0 * 1e6).round() / 1e6;
        writeln!(f, "Mutation Rate: {percent}%")?;
        match &self.best {
            Some(best) => {
                writeln!(f, "Best SDA:")?;
                write!(f, "{}", best.genotype)?;
                writeln!(f, "{BEST_LAYOUT_PREFIX}{}", phenotype_string(&best.phenotype))?;
                writeln!(f, "Best Fitness: {}", best.fitness)?;
            }
            None => writeln!(f, "Best SDA: none")?,
        }
        match self.average_fitness {
            Some(avg) => writeln!(f, "Average Fitness: {avg}")?,
            None => writeln!(f, "Average Fitness: n/a")?,
        }
        writeln!(f, "Live Members: {}/{}", self.live_members, self.pop_size)?;
        writeln!(f, "Failed Streams: {}", self.failed_streams)
    }
}

/// Append-only destination for run output.
pub trait ReportSink {
    /// Record the population's fitness values at a sampled step.
    fn fitness_values(&mut self, values: &[f64]) -> Result<()>;

    /// Record the final report.
    fn report(&mut self, report: &Report) -> Result<()>;
}

/// Writes plain text to any [`Write`].
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    /// Sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for WriterSink<W> {
    fn fitness_values(&mut self, values: &[f64]) -> Result<()> {
        writeln!(self.writer, "{}", fitness_line(values))?;
        Ok(())
    }

    fn report(&mut self, report: &Report) -> Result<()> {
        write!(self.writer, "{report}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Every fitness snapshot, in order.
    pub fitness_lines: Vec<Vec<f64>>,
    /// Every final report, in order.
    pub reports: Vec<Report>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Same text a [`WriterSink`] would have produced.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for values in &self.fitness_lines {
            out.push_str(&fitness_line(values));
            out.push('\n');
        }
        for report in &self.reports {
            out.push_str(&report.to_string());
        }
        out
    }
}

impl ReportSink for MemorySink {
    fn fitness_values(&mut self, values: &[f64]) -> Result<()> {
        self.fitness_lines.push(values.to_vec());
        Ok(())
    }

    fn report(&mut self, report: &Report) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sda::SdaConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample_report() -> Report {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let genotype = Sda::random(&SdaConfig::binary(2, 6), &mut rng);
        let phenotype = genotype.output().unwrap();
        Report {
            generations: 5,
            mutation_rate: 0.1,
            best: Some(BestMember {
                genotype,
                phenotype,
                fitness: 3.5,
            }),
            average_fitness: Some(4.25),
            live_members: 9,
            pop_size: 10,
            failed_streams: 0,
        }
    }

    #[test]
    fn test_fitness_line() {
        assert_eq!(fitness_line(&[1.5, 2.0, 3.25]), "Fitness Values: 1.5, 2, 3.25");
    }

    #[test]
    fn test_report_display() {
        let report = sample_report();
        let text = report.to_string();
        assert!(text.contains("Mutation Rate: 10%"));
        assert!(text.contains("Best Fitness: 3.5"));
        assert!(text.contains("Average Fitness: 4.25"));
        assert!(text.contains("Live Members: 9/10"));
        let layout_line = text
            .lines()
            .find(|l| l.starts_with(BEST_LAYOUT_PREFIX))
            .unwrap();
        assert_eq!(layout_line.split_whitespace().count(), 2 + 6);
    }

    #[test]
    fn test_writer_and_memory_sink_agree() {
        let report = sample_report();
        let mut memory = MemorySink::new();
        let mut writer = WriterSink::new(Vec::new());
        for sink in [&mut memory as &mut dyn ReportSink, &mut writer] {
            sink.fitness_values(&[1.0, 2.0]).unwrap();
            sink.report(&report).unwrap();
        }
        let written = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(written, memory.text());
    }

    #[test]
    fn test_report_json_roundtrip() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
