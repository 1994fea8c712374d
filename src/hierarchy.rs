//! Catalog tree: `Project -> Modality -> Subject -> Session -> Run`.
//!
//! Every level above `Run` is the same name-keyed [`Container`]; only the
//! child type differs. Children live in ordered maps so two catalogs built
//! from the same tree compare and serialize identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Coordinate;
use crate::error::CatalogError;

/// Acquisition parameters keyed by sidecar field name.
pub type Parameters = BTreeMap<String, Value>;

pub const ECHO_TIME_KEY: &str = "EchoTime";
pub const DEFAULT_ECHO_TIME: f64 = 1.0;

pub trait Named {
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    name: String,
    params: Parameters,
    echo_time: f64,
}

impl Run {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Parameters::new(),
            echo_time: DEFAULT_ECHO_TIME,
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn echo_time(&self) -> f64 {
        self.echo_time
    }

    /// Merges `params` into the run, later values winning, and re-derives the echo time.
    pub fn merge(&mut self, params: Parameters) {
        self.params.extend(params);
        self.echo_time = derive_echo_time(&self.params);
    }
}

impl Named for Run {
    fn name(&self) -> &str {
        &self.name
    }
}

/// `EchoTime` rounded to four decimals, or [`DEFAULT_ECHO_TIME`] when missing or non-numeric.
pub fn derive_echo_time(params: &Parameters) -> f64 {
    params
        .get(ECHO_TIME_KEY)
        .and_then(Value::as_f64)
        .map(round_to_four_decimals)
        .unwrap_or(DEFAULT_ECHO_TIME)
}

fn round_to_four_decimals(value: f64) -> f64 {
    // Past 1e15 an f64 has no fractional digits left, and scaling could overflow.
    if value.abs() >= 1e15 {
        return value;
    }
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container<T> {
    name: String,
    children: BTreeMap<String, T>,
}

pub type Session = Container<Run>;
pub type Subject = Container<Session>;
pub type Modality = Container<Subject>;
pub type Project = Container<Modality>;

impl<T: Named> Container<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.children.get(name)
    }

    /// Removes and returns a child so it can be extended and attached again.
    pub fn detach(&mut self, name: &str) -> Option<T> {
        self.children.remove(name)
    }

    /// Inserts `child` under its own name. Existing children are never replaced.
    pub fn attach(&mut self, child: T) -> Result<&mut T, CatalogError> {
        use std::collections::btree_map::Entry;

        match self.children.entry(child.name().to_string()) {
            Entry::Occupied(_) => Err(CatalogError::DuplicateNode {
                parent: self.name.clone(),
                child: child.name().to_string(),
            }),
            Entry::Vacant(slot) => Ok(slot.insert(child)),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &T> {
        self.children.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl<T> Named for Container<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeCounts {
    pub modalities: usize,
    pub subjects: usize,
    pub sessions: usize,
    pub runs: usize,
}

impl Project {
    /// Every run in the catalog with its coordinate, in name order.
    pub fn runs(&self) -> impl Iterator<Item = (Coordinate, &Run)> + '_ {
        self.children().flat_map(|modality| {
            modality.children().flat_map(move |subject| {
                subject.children().flat_map(move |session| {
                    session.children().map(move |run| {
                        let coordinate = Coordinate {
                            modality: modality.name().to_string(),
                            subject: subject.name().to_string(),
                            session: session.name().to_string(),
                            run: run.name().to_string(),
                        };
                        (coordinate, run)
                    })
                })
            })
        })
    }

    pub fn counts(&self) -> TreeCounts {
        let mut counts = TreeCounts {
            modalities: self.len(),
            ..TreeCounts::default()
        };
        for modality in self.children() {
            counts.subjects += modality.len();
            for subject in modality.children() {
                counts.sessions += subject.len();
                counts.runs += subject.children().map(Session::len).sum::<usize>();
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn echo_time_is_rounded_to_four_decimals() {
        let mut run = Run::new("sub-01_T1w.json");
        run.merge(params(&[(ECHO_TIME_KEY, json!(0.12345))]));
        assert_eq!(run.echo_time(), 0.1235);
    }

    #[test]
    fn huge_echo_time_stays_finite() {
        let mut run = Run::new("sub-01_T1w.json");
        run.merge(params(&[(ECHO_TIME_KEY, json!(1e305))]));
        assert_eq!(run.echo_time(), 1e305);

        run.merge(params(&[(ECHO_TIME_KEY, json!(-1.7976931348623157e308))]));
        assert!(run.echo_time().is_finite());
    }

    #[test]
    fn echo_time_defaults_when_missing() {
        let mut run = Run::new("sub-01_T1w.json");
        run.merge(params(&[("RepetitionTime", json!(2.3))]));
        assert_eq!(run.echo_time(), DEFAULT_ECHO_TIME);

        run.merge(params(&[(ECHO_TIME_KEY, json!("short"))]));
        assert_eq!(run.echo_time(), DEFAULT_ECHO_TIME);
    }

    #[test]
    fn merge_overwrites_earlier_values() {
        let mut run = Run::new("run");
        run.merge(params(&[("FlipAngle", json!(8)), (ECHO_TIME_KEY, json!(0.03))]));
        run.merge(params(&[("FlipAngle", json!(9))]));
        assert_eq!(run.params()["FlipAngle"], json!(9));
        assert_eq!(run.echo_time(), 0.03);
        assert_eq!(run.params().len(), 2);
    }

    #[test]
    fn attach_rejects_duplicate_names() {
        let mut session = Session::new("ses-01");
        session.attach(Run::new("a.json")).unwrap();
        let err = session.attach(Run::new("a.json")).unwrap_err();
        assert_matches!(err, CatalogError::DuplicateNode { parent, child } => {
            assert_eq!(parent, "ses-01");
            assert_eq!(child, "a.json");
        });
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn detach_then_attach_keeps_children() {
        let mut subject = Subject::new("sub-01");
        let mut session = Session::new("ses-01");
        session.attach(Run::new("a.json")).unwrap();
        subject.attach(session).unwrap();

        let mut session = subject.detach("ses-01").unwrap();
        assert!(subject.get("ses-01").is_none());
        session.attach(Run::new("b.json")).unwrap();
        subject.attach(session).unwrap();

        let names = subject.get("ses-01").unwrap().names().collect::<Vec<_>>();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn runs_carry_their_coordinates() {
        let mut session = Session::new("ses-01");
        session.attach(Run::new("a.json")).unwrap();
        let mut subject = Subject::new("sub-01");
        subject.attach(session).unwrap();
        let mut modality = Modality::new("anat");
        modality.attach(subject).unwrap();
        let mut project = Project::new("demo");
        project.attach(modality).unwrap();

        let runs = project.runs().collect::<Vec<_>>();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0.to_string(), "anat/sub-01/ses-01/a.json");
        assert_eq!(
            project.counts(),
            TreeCounts {
                modalities: 1,
                subjects: 1,
                sessions: 1,
                runs: 1
            }
        );
    }
}
