//! Snapshot generation for differential StructureDefinitions.
//!
//! A differential only lists the elements a profile constrains. Validation needs the full
//! element tree, so the differential is merged over the snapshot of its base definition:
//! base elements pass through, matching differential entries narrow them, and slices are
//! instantiated from the element they slice.
//!
//! Problems found while merging are collected as [`ValidationMessage`]s; generation itself
//! never fails. On a contradiction the base constraint is kept, so the result is the best
//! snapshot that can be built.

use crate::clients::SchemaLookup;
use fhir::{ElementDefinition, ElementList, IssueSeverity, MaxCardinality, StructureDefinition};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A structural problem found during snapshot generation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationMessage {
    pub severity: IssueSeverity,
    /// Element key (id or path), or the profile url for definition-level issues.
    pub location: String,
    pub message: String,
}

impl ValidationMessage {
    fn error(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            location: location.into(),
            message: message.into(),
        }
    }

    fn warning(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.location, self.message)
    }
}

/// Generated snapshot plus any messages. No messages means a clean snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotWithMessages {
    pub snapshot: StructureDefinition,
    pub messages: Vec<ValidationMessage>,
}

impl SnapshotWithMessages {
    pub fn is_clean(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity.is_error())
    }
}

/// Working state of one merge. Created per call and never shared.
#[derive(Debug, Default)]
struct MergeState {
    elements: Vec<ElementDefinition>,
    messages: Vec<ValidationMessage>,
}

impl MergeState {
    fn from_base(elements: &[ElementDefinition]) -> Self {
        Self {
            elements: elements.to_vec(),
            messages: Vec::new(),
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.key() == key)
    }

    /// Index just past the element at `index` and everything nested under it, slices included.
    fn subtree_end(&self, index: usize) -> usize {
        let root = self.elements[index].key();
        let children = format!("{root}.");
        let slices = format!("{root}:");
        self.elements[index + 1..]
            .iter()
            .position(|e| !(e.key().starts_with(&children) || e.key().starts_with(&slices)))
            .map(|offset| index + 1 + offset)
            .unwrap_or(self.elements.len())
    }

    /// Find or instantiate the working element that `diff` constrains, matched under `key`.
    fn resolve(&mut self, key: &str, diff: &ElementDefinition) -> Option<usize> {
        if let Some(index) = self.position(key) {
            return Some(index);
        }

        match &diff.slice_name {
            // Patient.identifier:mrn is templated on, and placed after, Patient.identifier.
            Some(name) => {
                let sliced = key.strip_suffix(name.as_str())?.strip_suffix(':')?;
                let template = self.position(sliced)?;
                Some(self.instantiate_slice(template, key, name))
            }
            // Patient.identifier:mrn.system is templated on Patient.identifier.system.
            None if key.contains(':') => {
                let parent = self.position(key.rsplit_once('.').map(|(p, _)| p)?)?;
                let template = self.position(&strip_slice_names(key))?;
                let mut element = self.elements[template].clone();
                element.id = Some(key.to_string());
                let at = self.subtree_end(parent);
                self.elements.insert(at, element);
                Some(at)
            }
            None => self.resolve_choice(key, &diff.path),
        }
    }

    /// Copy the element at `template` and its children as slice `name`, after every existing
    /// child and slice of the sliced element. Returns the index of the new slice.
    fn instantiate_slice(&mut self, template: usize, key: &str, name: &str) -> usize {
        let sliced = self.elements[template].key().to_string();
        let children = format!("{sliced}.");
        let end = self.subtree_end(template);

        let mut slice = self.elements[template].clone();
        slice.id = Some(key.to_string());
        slice.slice_name = Some(name.to_string());
        slice.extra.remove("slicing");

        let mut block = vec![slice];
        block.extend(
            self.elements[template + 1..end]
                .iter()
                .filter(|e| e.key().starts_with(&children))
                .map(|e| {
                    let mut child = e.clone();
                    child.id = Some(format!("{key}{}", &e.key()[sliced.len()..]));
                    child
                }),
        );

        self.elements.splice(end..end, block);
        end
    }

    /// `Observation.valueQuantity` constrains `Observation.value[x]` to `Quantity`. The choice
    /// element takes the type-specific name and keeps only that type.
    fn resolve_choice(&mut self, key: &str, path: &str) -> Option<usize> {
        let (index, type_ref) = self.elements.iter().enumerate().find_map(|(index, e)| {
            let suffix = key.strip_prefix(e.key().strip_suffix("[x]")?)?;
            let type_ref = e.types.iter().find(|t| choice_suffix(&t.code) == suffix)?;
            Some((index, type_ref.clone()))
        })?;

        let element = &mut self.elements[index];
        element.id = Some(key.to_string());
        element.path = path.to_string();
        element.types = vec![type_ref];
        Some(index)
    }

    fn merge(&mut self, diff: &ElementDefinition) {
        let key = match_key(diff);
        let Some(index) = self.resolve(&key, diff) else {
            self.messages.push(ValidationMessage::error(
                &key,
                format!("element '{key}' cannot be resolved against the base definition"),
            ));
            return;
        };

        let mut findings = Vec::new();
        narrow(&mut self.elements[index], diff, &mut |message: String| {
            findings.push(ValidationMessage::error(&key, message))
        });
        self.messages.extend(findings);
    }
}

/// Key a differential entry is matched under. An entry naming a slice addresses the slice,
/// even when its id is missing or stops at the sliced element.
fn match_key(diff: &ElementDefinition) -> String {
    let key = diff.key();
    match &diff.slice_name {
        Some(name) if !key.ends_with(&format!(":{name}")) => format!("{}:{name}", diff.path),
        _ => key.to_string(),
    }
}

/// `dateTime` -> `DateTime`, as the type appears in a choice element name.
fn choice_suffix(code: &str) -> String {
    let mut chars = code.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Apply `diff` to `target`, reporting contradictions through `report`.
fn narrow(target: &mut ElementDefinition, diff: &ElementDefinition, report: &mut dyn FnMut(String)) {
    if let Some(min) = diff.min {
        match target.min {
            Some(base) if min < base => {
                report(format!("min relaxed from {base} to {min}"));
            }
            _ => target.min = Some(min),
        }
    }

    if let Some(max) = &diff.max {
        match max.parse::<MaxCardinality>() {
            Err(e) => report(e.to_string()),
            Ok(wanted) => match target.max_cardinality() {
                Some(Ok(base)) if wanted > base => {
                    report(format!("max widened from {base} to {wanted}"));
                }
                _ => target.max = Some(max.clone()),
            },
        }
    }

    if let (Some(min), Some(Ok(MaxCardinality::Bounded(max)))) = (target.min, target.max_cardinality())
    {
        if min > max {
            report(format!("min {min} exceeds max {max}"));
        }
    }

    if !diff.types.is_empty() {
        let incompatible: Vec<&str> = diff
            .types
            .iter()
            .filter(|t| !target.types.is_empty() && !target.types.iter().any(|b| b.code == t.code))
            .map(|t| t.code.as_str())
            .collect();

        if incompatible.is_empty() {
            target.types = diff.types.clone();
        } else {
            let allowed: Vec<&str> = target.types.iter().map(|t| t.code.as_str()).collect();
            report(format!(
                "type {} is not allowed by the base (allowed: {})",
                incompatible.join(", "),
                allowed.join(", ")
            ));
        }
    }

    if let Some(binding) = &diff.binding {
        let base = target.binding.as_ref().map(|b| b.strength);
        match base {
            Some(base) if binding.strength.strictness() < base.strictness() => {
                report(format!(
                    "binding strength weakened from {base:?} to {:?}",
                    binding.strength
                ));
            }
            _ => target.binding = Some(binding.clone()),
        }
    }

    if diff.short.is_some() {
        target.short = diff.short.clone();
    }
    if diff.definition.is_some() {
        target.definition = diff.definition.clone();
    }
    if diff.must_support.is_some() {
        target.must_support = diff.must_support;
    }
    for (name, value) in &diff.extra {
        target.extra.insert(name.clone(), value.clone());
    }
}

/// `Patient.identifier:mrn.system` -> `Patient.identifier.system`
fn strip_slice_names(key: &str) -> String {
    key.split('.')
        .map(|segment| segment.split_once(':').map_or(segment, |(name, _)| name))
        .collect::<Vec<_>>()
        .join(".")
}

/// Generates snapshots against base definitions from a [`SchemaLookup`].
#[derive(Clone)]
pub struct SnapshotGenerator {
    lookup: Arc<dyn SchemaLookup>,
}

impl SnapshotGenerator {
    pub fn new(lookup: Arc<dyn SchemaLookup>) -> Self {
        Self { lookup }
    }

    /// Merge `differential` over its base and return the snapshot with any messages.
    ///
    /// A missing base produces a warning and a snapshot built from the differential alone.
    pub fn generate_snapshot(&self, differential: &StructureDefinition) -> SnapshotWithMessages {
        tracing::debug!(
            "Generating snapshot for StructureDefinition with url {}",
            differential.canonical()
        );

        let base = differential
            .base_definition
            .as_deref()
            .and_then(|url| self.lookup.fetch_by_url(url));

        let mut state = match &base {
            Some(base) if !base.snapshot_elements().is_empty() => {
                let mut state = MergeState::from_base(base.snapshot_elements());
                check_root(&mut state, differential, base);
                for element in differential.differential_elements() {
                    state.merge(element);
                }
                state
            }
            Some(base) => {
                tracing::warn!("Base definition with url {} has no snapshot", base.url);
                degenerate(
                    differential,
                    ValidationMessage::error(
                        &differential.url,
                        format!("base definition '{}' has no snapshot", base.url),
                    ),
                )
            }
            None => {
                let base_url = differential.base_definition.as_deref().unwrap_or("<none>");
                tracing::warn!("Base definition with url {base_url} not found");
                degenerate(
                    differential,
                    ValidationMessage::warning(
                        &differential.url,
                        format!(
                            "base definition '{base_url}' not found, snapshot built from differential only"
                        ),
                    ),
                )
            }
        };

        let mut snapshot = differential.clone();
        snapshot.snapshot = Some(ElementList {
            element: std::mem::take(&mut state.elements),
        });

        if state.messages.is_empty() {
            tracing::debug!(
                "Snapshot generated for StructureDefinition with url {}",
                differential.canonical()
            );
        } else {
            for message in &state.messages {
                tracing::warn!(
                    "Error while generating snapshot for StructureDefinition with url {}: {}",
                    differential.canonical(),
                    message
                );
            }
        }

        SnapshotWithMessages {
            snapshot,
            messages: state.messages,
        }
    }
}

fn degenerate(differential: &StructureDefinition, message: ValidationMessage) -> MergeState {
    let mut state = MergeState::from_base(differential.differential_elements());
    state.messages.push(message);
    state
}

fn check_root(state: &mut MergeState, differential: &StructureDefinition, base: &StructureDefinition) {
    let root = base.snapshot_elements().first().map(|e| e.path.as_str());
    if root != Some(differential.type_.as_str()) {
        state.messages.push(ValidationMessage::error(
            &differential.url,
            format!(
                "root element '{}' of base '{}' does not match type '{}'",
                root.unwrap_or(""),
                base.url,
                differential.type_
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::InMemorySchemaLookup;
    use fhir::{Binding, BindingStrength, TypeRef};

    const BASE_URL: &str = "http://hl7.org/fhir/StructureDefinition/Patient";
    const PROFILE_URL: &str = "http://example.org/fhir/StructureDefinition/codex-patient";

    fn element(path: &str, min: u32, max: &str, types: &[&str]) -> ElementDefinition {
        ElementDefinition {
            id: Some(path.to_string()),
            min: Some(min),
            max: Some(max.to_string()),
            types: types.iter().map(|code| TypeRef::new(*code)).collect(),
            ..ElementDefinition::new(path)
        }
    }

    fn base_patient() -> StructureDefinition {
        let mut gender = element("Patient.gender", 0, "1", &["code"]);
        gender.binding = Some(Binding {
            strength: BindingStrength::Required,
            value_set: Some("http://hl7.org/fhir/ValueSet/administrative-gender".into()),
            description: None,
        });

        let mut base = StructureDefinition::new(BASE_URL, "Patient");
        base.snapshot = Some(ElementList {
            element: vec![
                element("Patient", 0, "*", &[]),
                element("Patient.identifier", 0, "*", &["Identifier"]),
                element("Patient.identifier.system", 0, "1", &["uri"]),
                element("Patient.identifier.value", 0, "1", &["string"]),
                gender,
            ],
        });
        base
    }

    fn profile(differential: Vec<ElementDefinition>) -> StructureDefinition {
        let mut profile = StructureDefinition::new(PROFILE_URL, "Patient");
        profile.base_definition = Some(BASE_URL.into());
        profile.derivation = Some("constraint".into());
        profile.differential = Some(ElementList {
            element: differential,
        });
        profile
    }

    fn generator() -> SnapshotGenerator {
        let mut lookup = InMemorySchemaLookup::new();
        lookup.insert(base_patient());
        SnapshotGenerator::new(Arc::new(lookup))
    }

    fn keys(result: &SnapshotWithMessages) -> Vec<&str> {
        result
            .snapshot
            .snapshot_elements()
            .iter()
            .map(ElementDefinition::key)
            .collect()
    }

    fn diff(id: &str) -> ElementDefinition {
        ElementDefinition {
            id: Some(id.to_string()),
            ..ElementDefinition::new(strip_slice_names(id))
        }
    }

    #[test]
    fn narrowing_produces_clean_snapshot() {
        let mut identifier = diff("Patient.identifier");
        identifier.min = Some(1);
        identifier.must_support = Some(true);

        let result = generator().generate_snapshot(&profile(vec![identifier]));

        assert!(result.is_clean(), "{:?}", result.messages);
        let elements = result.snapshot.snapshot_elements();
        assert_eq!(elements.len(), 5);
        assert_eq!(elements[1].min, Some(1));
        assert_eq!(elements[1].must_support, Some(true));
        assert_eq!(elements[2], base_patient().snapshot_elements()[2]);
        assert_eq!(result.snapshot.url, PROFILE_URL);
        assert_eq!(result.snapshot.differential_elements().len(), 1);
    }

    #[test]
    fn missing_base_yields_warning_and_degenerate_snapshot() {
        let generator = SnapshotGenerator::new(Arc::new(InMemorySchemaLookup::new()));
        let mut identifier = diff("Patient.identifier");
        identifier.min = Some(1);

        let result = generator.generate_snapshot(&profile(vec![identifier.clone()]));

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].severity, IssueSeverity::Warning);
        assert!(!result.has_errors());
        assert_eq!(result.snapshot.snapshot_elements(), &[identifier]);
    }

    #[test]
    fn undeclared_base_is_treated_as_missing() {
        let mut definition = profile(vec![diff("Patient")]);
        definition.base_definition = None;

        let result = generator().generate_snapshot(&definition);

        assert_eq!(result.messages.len(), 1);
        assert!(result.messages[0].message.contains("<none>"));
    }

    #[test]
    fn cardinality_widening_is_reported_and_base_kept() {
        let mut system = diff("Patient.identifier.system");
        system.max = Some("*".into());
        let mut value = diff("Patient.identifier.value");
        value.min = Some(2);

        let result = generator().generate_snapshot(&profile(vec![system, value]));

        let messages: Vec<_> = result.messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(messages, vec!["max widened from 1 to *", "min 2 exceeds max 1"]);
        assert!(result.has_errors());
        assert_eq!(result.snapshot.snapshot_elements()[2].max.as_deref(), Some("1"));
    }

    #[test]
    fn relaxed_min_is_reported() {
        const NARROWED_URL: &str = "http://example.org/fhir/StructureDefinition/identified-patient";

        let mut narrowed = base_patient();
        narrowed.url = NARROWED_URL.into();
        if let Some(list) = narrowed.snapshot.as_mut() {
            list.element[1].min = Some(1);
        }
        let mut lookup = InMemorySchemaLookup::new();
        lookup.insert(narrowed);

        let mut relaxed = diff("Patient.identifier");
        relaxed.min = Some(0);
        let mut definition = profile(vec![relaxed]);
        definition.base_definition = Some(NARROWED_URL.into());

        let result = SnapshotGenerator::new(Arc::new(lookup)).generate_snapshot(&definition);

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].message, "min relaxed from 1 to 0");
        assert_eq!(result.messages[0].location, "Patient.identifier");
        assert_eq!(result.snapshot.snapshot_elements()[1].min, Some(1));
    }

    #[test]
    fn incompatible_type_is_reported() {
        let mut identifier = diff("Patient.identifier");
        identifier.types = vec![TypeRef::new("string")];

        let result = generator().generate_snapshot(&profile(vec![identifier]));

        assert_eq!(result.messages.len(), 1);
        assert!(result.messages[0].message.contains("type string is not allowed"));
        assert_eq!(result.snapshot.snapshot_elements()[1].types[0].code, "Identifier");
    }

    #[test]
    fn weakened_binding_is_reported() {
        let mut gender = diff("Patient.gender");
        gender.binding = Some(Binding {
            strength: BindingStrength::Preferred,
            value_set: None,
            description: None,
        });

        let result = generator().generate_snapshot(&profile(vec![gender]));

        assert_eq!(result.messages.len(), 1);
        assert!(result.messages[0].message.contains("weakened"));
    }

    #[test]
    fn unknown_path_is_reported_and_skipped() {
        let result = generator().generate_snapshot(&profile(vec![diff("Patient.favouriteColour")]));

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].location, "Patient.favouriteColour");
        assert_eq!(result.snapshot.snapshot_elements().len(), 5);
    }

    #[test]
    fn slices_are_inserted_after_sliced_subtree() {
        let mut slice = diff("Patient.identifier:pseudonym");
        slice.slice_name = Some("pseudonym".into());
        slice.min = Some(1);
        slice.max = Some("1".into());
        let mut system = diff("Patient.identifier:pseudonym.system");
        system.min = Some(1);
        system.extra.insert(
            "fixedUri".into(),
            serde_json::json!("http://www.netzwerk-universitaetsmedizin.de/sid/dic-pseudonym"),
        );

        let result = generator().generate_snapshot(&profile(vec![slice, system]));

        assert!(result.is_clean(), "{:?}", result.messages);
        assert_eq!(
            keys(&result),
            vec![
                "Patient",
                "Patient.identifier",
                "Patient.identifier.system",
                "Patient.identifier.value",
                "Patient.identifier:pseudonym",
                "Patient.identifier:pseudonym.system",
                "Patient.identifier:pseudonym.value",
                "Patient.gender",
            ]
        );
        let elements = result.snapshot.snapshot_elements();
        assert_eq!(elements[4].slice_name.as_deref(), Some("pseudonym"));
        assert_eq!(elements[4].path, "Patient.identifier");
        assert_eq!(elements[4].types[0].code, "Identifier");
        assert_eq!(elements[5].path, "Patient.identifier.system");
        assert_eq!(elements[5].min, Some(1));
        assert!(elements[5].extra.contains_key("fixedUri"));
        assert_eq!(elements[2].min, Some(0));
        assert!(!elements[2].extra.contains_key("fixedUri"));
        assert_eq!(elements[1].min, Some(0));
    }

    #[test]
    fn slice_without_id_does_not_constrain_sliced_element() {
        let mut slice = ElementDefinition::new("Patient.identifier");
        slice.slice_name = Some("pseudonym".into());
        slice.max = Some("1".into());

        let result = generator().generate_snapshot(&profile(vec![slice]));

        assert!(result.is_clean(), "{:?}", result.messages);
        let elements = result.snapshot.snapshot_elements();
        assert_eq!(elements[1].key(), "Patient.identifier");
        assert_eq!(elements[1].max.as_deref(), Some("*"));
        assert_eq!(elements[1].slice_name, None);
        assert_eq!(elements[4].key(), "Patient.identifier:pseudonym");
        assert_eq!(elements[4].max.as_deref(), Some("1"));
    }

    #[test]
    fn slice_copies_children_of_sliced_element() {
        let mut slice = diff("Patient.identifier:pseudonym");
        slice.slice_name = Some("pseudonym".into());

        let result = generator().generate_snapshot(&profile(vec![slice]));

        assert!(result.is_clean(), "{:?}", result.messages);
        assert_eq!(
            keys(&result)[4..],
            [
                "Patient.identifier:pseudonym",
                "Patient.identifier:pseudonym.system",
                "Patient.identifier:pseudonym.value",
                "Patient.gender",
            ]
        );
        let elements = result.snapshot.snapshot_elements();
        assert_eq!(elements[6].path, "Patient.identifier.value");
        assert_eq!(elements[6].types[0].code, "string");
    }

    #[test]
    fn second_slice_follows_first_and_skips_its_children() {
        let mut first = diff("Patient.identifier:pseudonym");
        first.slice_name = Some("pseudonym".into());
        let mut second = diff("Patient.identifier:mrn");
        second.slice_name = Some("mrn".into());

        let result = generator().generate_snapshot(&profile(vec![first, second]));

        assert!(result.is_clean(), "{:?}", result.messages);
        assert_eq!(
            keys(&result)[7..],
            [
                "Patient.identifier:mrn",
                "Patient.identifier:mrn.system",
                "Patient.identifier:mrn.value",
                "Patient.gender",
            ]
        );
    }

    #[test]
    fn type_specific_name_constrains_choice_element() {
        const OBSERVATION_URL: &str = "http://hl7.org/fhir/StructureDefinition/Observation";

        let mut base = StructureDefinition::new(OBSERVATION_URL, "Observation");
        base.snapshot = Some(ElementList {
            element: vec![
                element("Observation", 0, "*", &[]),
                element("Observation.status", 1, "1", &["code"]),
                element(
                    "Observation.value[x]",
                    0,
                    "1",
                    &["Quantity", "string", "CodeableConcept"],
                ),
            ],
        });
        let mut lookup = InMemorySchemaLookup::new();
        lookup.insert(base);

        let mut value = diff("Observation.valueQuantity");
        value.min = Some(1);
        let mut definition = StructureDefinition::new(PROFILE_URL, "Observation");
        definition.base_definition = Some(OBSERVATION_URL.into());
        definition.differential = Some(ElementList {
            element: vec![value],
        });

        let result = SnapshotGenerator::new(Arc::new(lookup)).generate_snapshot(&definition);

        assert!(result.is_clean(), "{:?}", result.messages);
        let elements = result.snapshot.snapshot_elements();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[2].key(), "Observation.valueQuantity");
        assert_eq!(elements[2].path, "Observation.valueQuantity");
        assert_eq!(elements[2].types, vec![TypeRef::new("Quantity")]);
        assert_eq!(elements[2].min, Some(1));
    }

    #[test]
    fn choice_suffix_capitalises_type_code() {
        assert_eq!(choice_suffix("dateTime"), "DateTime");
        assert_eq!(choice_suffix("Quantity"), "Quantity");
        assert_eq!(choice_suffix(""), "");
    }

    #[test]
    fn root_type_mismatch_is_reported() {
        let mut definition = profile(vec![]);
        definition.type_ = "Observation".into();

        let result = generator().generate_snapshot(&definition);

        assert_eq!(result.messages.len(), 1);
        assert!(result.messages[0].message.contains("does not match type 'Observation'"));
    }

    #[test]
    fn strips_slice_names_from_keys() {
        assert_eq!(
            strip_slice_names("Patient.identifier:a.extension:b.value"),
            "Patient.identifier.extension.value"
        );
    }
}
