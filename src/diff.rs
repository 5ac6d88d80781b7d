use crate::flat::FieldMap;
use crate::types::FieldChange;

/// Collects `(field, old, new)` for every field of `current` that is new or
/// differs from `previous`. Fields missing from `current` are not changes:
/// a resource answer never removes cached values.
pub(crate) fn diff_fields<'a>(
    previous: &'a FieldMap,
    current: &'a FieldMap,
    changes: &mut Vec<(&'a str, Option<&'a str>, &'a str)>,
) {
    for (field, value) in current {
        match previous.get(field) {
            Some(old) if old == value => {}
            old => changes.push((field, old.map(String::as_str), value)),
        }
    }
}

pub(crate) fn field_changes(resource: &str, previous: &FieldMap, current: &FieldMap) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    diff_fields(previous, current, &mut changes);
    changes
        .into_iter()
        .map(|(field, old, new)| FieldChange {
            resource: resource.to_string(),
            field: field.to_string(),
            old: old.map(str::to_string),
            new: new.to_string(),
        })
        .collect()
}
