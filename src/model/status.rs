//! Canonical status vocabulary and the legacy aliases still accepted on input.
//!
//! Statuses were originally stored with the labels of the Spanish UI. The canonical
//! vocabulary is English; legacy labels are mapped to canonical form on every write and
//! rewritten in place by the `normalize_status` migration.

use crate::error::AppError;
use crate::model::EntityKind;

/// Legacy label -> canonical value.
pub const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("activo", "active"),
    ("inactivo", "inactive"),
    ("prospecto", "prospect"),
    ("disponible", "available"),
    ("reservado", "reserved"),
    ("vendido", "sold"),
    ("pendiente", "pending"),
    ("en_progreso", "in_progress"),
    ("en progreso", "in_progress"),
    ("completado", "completed"),
    ("completada", "completed"),
    ("cancelado", "cancelled"),
    ("cancelada", "cancelled"),
    ("planificacion", "planning"),
    ("planificación", "planning"),
    ("en_construccion", "under_construction"),
    ("en construcción", "under_construction"),
    ("finalizado", "finished"),
    ("enviado", "sent"),
    ("fallido", "failed"),
];

/// Canonical statuses per entity kind. Kinds without a status column return an empty slice.
pub fn vocabulary(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Client => &["prospect", "active", "inactive"],
        EntityKind::Project => &["planning", "under_construction", "active", "finished"],
        EntityKind::Unit => &["available", "reserved", "sold"],
        EntityKind::Sale => &["pending", "completed", "cancelled"],
        EntityKind::Task => &["pending", "in_progress", "completed", "cancelled"],
        EntityKind::Reminder => &["pending", "sent", "cancelled"],
        EntityKind::Backup => &["pending", "completed", "failed"],
        EntityKind::Note | EntityKind::User => &[],
    }
}

/// Map a legacy or canonical label to its canonical value for `kind`.
/// Matching ignores case and surrounding whitespace.
pub fn canonicalize(kind: EntityKind, input: &str) -> Result<&'static str, AppError> {
    let needle = input.trim().to_lowercase();
    let vocab = vocabulary(kind);
    if let Some(v) = vocab.iter().find(|v| **v == needle) {
        return Ok(*v);
    }
    LEGACY_ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == needle)
        .and_then(|(_, canonical)| vocab.iter().find(|v| *v == canonical))
        .copied()
        .ok_or_else(|| {
            AppError::Validation(format!(
                "'{}' is not a valid {} status (expected one of: {})",
                input,
                kind,
                vocab.join(", ")
            ))
        })
}

/// Legacy aliases whose canonical value belongs to `kind`'s vocabulary, for backfills.
pub fn aliases_for(kind: EntityKind) -> Vec<(&'static str, &'static str)> {
    let vocab = vocabulary(kind);
    LEGACY_ALIASES
        .iter()
        .filter(|(_, canonical)| vocab.contains(canonical))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EntityKind::Client, "activo", "active")]
    #[case(EntityKind::Client, "active", "active")]
    #[case(EntityKind::Unit, " Disponible ", "available")]
    #[case(EntityKind::Task, "en progreso", "in_progress")]
    #[case(EntityKind::Project, "planificación", "planning")]
    fn canonicalizes_legacy_and_canonical(#[case] kind: EntityKind, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(canonicalize(kind, input).unwrap(), expected);
    }

    #[test]
    fn rejects_status_outside_the_kind_vocabulary() {
        // "vendido" is a unit status, not a task status.
        let err = canonicalize(EntityKind::Task, "vendido").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(canonicalize(EntityKind::Unit, "bogus").is_err());
    }

    #[test]
    fn every_alias_targets_a_known_status() {
        for (legacy, canonical) in LEGACY_ALIASES {
            let known = EntityKind::ALL.iter().any(|k| vocabulary(*k).contains(canonical));
            assert!(known, "{} -> {} has no owner", legacy, canonical);
        }
    }

    #[test]
    fn aliases_are_filtered_per_kind() {
        let unit = aliases_for(EntityKind::Unit);
        assert!(unit.contains(&("vendido", "sold")));
        assert!(!unit.iter().any(|(_, c)| *c == "pending"));
        assert!(aliases_for(EntityKind::Note).is_empty());
    }
}
