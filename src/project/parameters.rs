//! Parameter aggregation and provenance
//!
//! Aggregated parameters arrive as a sequence ordered from the most distant
//! included project to the project itself. Folding that sequence into a map
//! lets later entries win, so the closest definer takes precedence.

use crate::provider::ParameterRecord;
use std::collections::BTreeMap;

/// A parameter together with the project that defined it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedParameter {
    pub project: String,
    pub record: ParameterRecord,
}

/// Provenance of every key in `sequence`.
///
/// A key defined once maps to its definer. A redefined key maps to
/// `"<nearest> (<next nearest> -> ... -> <most distant>)"`. The same definer
/// appearing twice in a row is counted once.
pub fn origins(sequence: &[SourcedParameter]) -> BTreeMap<String, String> {
    let mut definers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for parameter in sequence {
        let chain = definers.entry(parameter.record.key.as_str()).or_default();
        if chain.last() != Some(&parameter.project.as_str()) {
            chain.push(&parameter.project);
        }
    }

    definers
        .into_iter()
        .map(|(key, chain)| (key.to_string(), describe(&chain)))
        .collect()
}

fn describe(chain: &[&str]) -> String {
    match chain.split_last() {
        None => String::new(),
        Some((nearest, [])) => (*nearest).to_string(),
        Some((nearest, earlier)) => {
            let earlier: Vec<&str> = earlier.iter().rev().copied().collect();
            format!("{nearest} ({})", earlier.join(" -> "))
        }
    }
}

/// Folded parameters, partitioned by the secret flag of each winning record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    pub params: BTreeMap<String, String>,
    pub param_origins: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    pub secret_origins: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn fold(sequence: &[SourcedParameter]) -> Self {
        let mut winners: BTreeMap<&str, &ParameterRecord> = BTreeMap::new();
        for parameter in sequence {
            winners.insert(&parameter.record.key, &parameter.record);
        }
        let mut origins = origins(sequence);

        let mut set = Self::default();
        for (key, record) in winners {
            let origin = origins.remove(key).unwrap_or_default();
            if record.secret {
                set.secrets.insert(key.to_string(), record.value.clone());
                set.secret_origins.insert(key.to_string(), origin);
            } else {
                set.params.insert(key.to_string(), record.value.clone());
                set.param_origins.insert(key.to_string(), origin);
            }
        }
        set
    }
}
