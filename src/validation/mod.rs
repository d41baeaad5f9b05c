//! Attachment validation engine
//!
//! Pure checks for a proposed policy attachment against table-schema facts
//! and the set of already-attached selectors. All applicable checks run and
//! failures accumulate; an attachment with zero failures is admissible.

use std::collections::BTreeSet;
use std::fmt;

use crate::column::ColumnSelector;
use crate::layout::TableSchema;

/// Kinds of attachment validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationFailureKind {
    /// Qualified selector names a column absent from the table schema.
    NoQualifiedColumnInTable,
    /// Family-level selector targets a family that is not map-type.
    GroupTypeFamilyAttachment,
    /// Conflicts with an existing attachment (same selector, or the
    /// family/qualified exclusivity rule).
    FreshenerAlreadyAttached,
    /// Producer reference is not a valid fully qualified identifier.
    BadProducerName,
    /// Policy reference is not a valid fully qualified identifier.
    BadPolicyName,
}

impl ValidationFailureKind {
    /// Stable string code for this failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailureKind::NoQualifiedColumnInTable => "NO_QUALIFIED_COLUMN_IN_TABLE",
            ValidationFailureKind::GroupTypeFamilyAttachment => "GROUP_TYPE_FAMILY_ATTACHMENT",
            ValidationFailureKind::FreshenerAlreadyAttached => "FRESHENER_ALREADY_ATTACHED",
            ValidationFailureKind::BadProducerName => "BAD_PRODUCER_NAME",
            ValidationFailureKind::BadPolicyName => "BAD_POLICY_NAME",
        }
    }
}

impl fmt::Display for ValidationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single validation failure with its cause-specific message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Failure kind.
    pub kind: ValidationFailureKind,
    /// Human-readable cause.
    pub message: String,
}

impl ValidationFailure {
    /// Create a failure.
    pub fn new(kind: ValidationFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Validate a proposed attachment. Pure: reads schema facts and the existing
/// attachment set, mutates nothing. Returns every applicable failure rather
/// than short-circuiting on the first.
pub fn validate_attachment(
    table: &str,
    schema: &dyn TableSchema,
    existing: &BTreeSet<ColumnSelector>,
    selector: &ColumnSelector,
    producer_ref: &str,
    policy_ref: &str,
) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    match &selector.qualifier {
        Some(qualifier) => {
            if !schema.column_exists(&selector.family, qualifier) {
                failures.push(ValidationFailure::new(
                    ValidationFailureKind::NoQualifiedColumnInTable,
                    format!(
                        "Table: {} does not contain specified column: {}",
                        table, selector
                    ),
                ));
            }
            if existing.contains(&selector.family_selector()) {
                failures.push(ValidationFailure::new(
                    ValidationFailureKind::FreshenerAlreadyAttached,
                    format!(
                        "There is already a freshness policy attached to family: {}. Freshness \
                         policies may not be attached to a map type family and fully qualified \
                         columns within that family.",
                        selector.family
                    ),
                ));
            }
        }
        None => {
            if !schema.is_map_type_family(&selector.family) {
                failures.push(ValidationFailure::new(
                    ValidationFailureKind::GroupTypeFamilyAttachment,
                    format!(
                        "Specified family: {} is not a valid map type family in the table: {}",
                        selector.family, table
                    ),
                ));
            }
            let qualified_conflict = existing
                .iter()
                .any(|attached| attached.family == selector.family && !attached.is_family());
            if qualified_conflict {
                failures.push(ValidationFailure::new(
                    ValidationFailureKind::FreshenerAlreadyAttached,
                    format!(
                        "There is already a freshness policy attached to a fully qualified column \
                         in family: {}. Freshness policies may not be attached to a map type \
                         family and fully qualified columns within that family.",
                        selector.family
                    ),
                ));
            }
        }
    }

    if !is_valid_ref(producer_ref) {
        failures.push(ValidationFailure::new(
            ValidationFailureKind::BadProducerName,
            format!(
                "Producer reference: {} is not a valid fully qualified identifier.",
                producer_ref
            ),
        ));
    }
    if !is_valid_ref(policy_ref) {
        failures.push(ValidationFailure::new(
            ValidationFailureKind::BadPolicyName,
            format!(
                "Policy reference: {} is not a valid fully qualified identifier.",
                policy_ref
            ),
        ));
    }

    failures
}

/// Whether a producer/policy reference is a syntactically valid fully
/// qualified identifier: non-empty dot-separated segments, each of the form
/// `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_ref(reference: &str) -> bool {
    if reference.is_empty() {
        return false;
    }
    reference.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
