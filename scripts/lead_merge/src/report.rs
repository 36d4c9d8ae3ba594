//! Summary statistics over a merged lead table

use crate::types::LeadRecord;
use serde::Serialize;

/// How many leads carry one value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
    /// Share of all leads, 0.0 to 100.0
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsultantCount {
    pub name: String,
    pub unit: String,
    pub count: usize,
}

/// Counts by car series, channel and consultant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadReport {
    pub total: usize,
    pub models: Vec<ValueCount>,
    pub channels: Vec<ValueCount>,
    pub consultants: Vec<ConsultantCount>,
}

/// Count values, most frequent first; equal counts keep first-seen order
fn value_counts<'a>(values: impl Iterator<Item = &'a str>, total: usize) -> Vec<ValueCount> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }
    // stable sort keeps first appearance among ties
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    counts
        .into_iter()
        .map(|(value, count)| ValueCount {
            value: value.to_string(),
            count,
            percent: if total == 0 { 0.0 } else { count as f64 * 100.0 / total as f64 },
        })
        .collect()
}

impl LeadReport {
    pub fn build(records: &[LeadRecord]) -> Self {
        let total = records.len();
        let models = value_counts(records.iter().map(|r| r.intent_series.as_str()), total);
        let channels = value_counts(records.iter().map(|r| r.source_channel.as_str()), total);

        let consultants = value_counts(records.iter().map(|r| r.consultant.as_str()), total)
            .into_iter()
            .map(|vc| {
                let unit = records
                    .iter()
                    .find(|r| r.consultant == vc.value)
                    .map(|r| r.unit.clone())
                    .unwrap_or_default();
                ConsultantCount {
                    name: vc.value,
                    unit,
                    count: vc.count,
                }
            })
            .collect();

        Self {
            total,
            models,
            channels,
            consultants,
        }
    }

    pub fn distinct_models(&self) -> usize {
        self.models.len()
    }

    pub fn top_models(&self, n: usize) -> &[ValueCount] {
        &self.models[..n.min(self.models.len())]
    }
}

impl std::fmt::Display for LeadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total leads: {}", self.total)?;
        writeln!(f, "Car series: {}", self.distinct_models())?;
        writeln!(f, "Channels: {}", self.channels.len())?;

        writeln!(f, "\nTop car series:")?;
        for (i, model) in self.top_models(5).iter().enumerate() {
            writeln!(f, "  {}. {}: {} ({:.1}%)", i + 1, model.value, model.count, model.percent)?;
        }

        writeln!(f, "\nBy channel:")?;
        for channel in &self.channels {
            writeln!(f, "  {}: {}", channel.value, channel.count)?;
        }

        writeln!(f, "\nBy consultant:")?;
        for consultant in &self.consultants {
            writeln!(f, "  {} ({}): {}", consultant.name, consultant.unit, consultant.count)?;
        }
        Ok(())
    }
}
