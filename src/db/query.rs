//! Dynamic SQL construction for listing filters and sparse patches.
//!
//! Every present filter/patch field contributes one clause and one positional
//! parameter; values are never interpolated into query text. Substring
//! filters bind a `%value%` argument to `LIKE ?`, so filter input cannot
//! change the shape of the statement.

use crate::model::{Field, Filter, OwnerPatch, VehiclePatch};

/// Positional parameter value produced by the builder and bound by the
/// repository in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Text(String),
    Int(i64),
    Null,
}

/// AND-combined predicate set shared by the listing and count queries.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Predicates {
    pub clauses: Vec<String>,
    pub args: Vec<Arg>,
}

impl Predicates {
    /// Renders ` WHERE a AND b` or an empty string for an empty filter.
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Builds the predicate set for a listing filter. The same value must feed
/// both the page query and the count query so their row sets agree.
pub fn filter_predicates(filter: &Filter) -> Predicates {
    let mut preds = Predicates::default();
    if let Some(range) = &filter.year {
        preds
            .clauses
            .push("vehicles.year BETWEEN ? AND ?".to_string());
        preds.args.push(Arg::Int(range.start));
        preds.args.push(Arg::Int(range.end));
    }
    push_like(&mut preds, "vehicles.reg_num", filter.reg_num.as_deref());
    push_like(&mut preds, "vehicles.mark", filter.mark.as_deref());
    push_like(&mut preds, "vehicles.model", filter.model.as_deref());
    push_like(&mut preds, "owners.name", filter.name.as_deref());
    push_like(&mut preds, "owners.surname", filter.surname.as_deref());
    push_like(&mut preds, "owners.patronymic", filter.patronymic.as_deref());
    preds
}

fn push_like(preds: &mut Predicates, column: &str, value: Option<&str>) {
    if let Some(value) = value {
        preds.clauses.push(format!("{column} LIKE ?"));
        preds.args.push(Arg::Text(format!("%{value}%")));
    }
}

/// Assignment set for one side of a patch (`SET` clause plus its arguments).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Assignments {
    pub columns: Vec<String>,
    pub args: Vec<Arg>,
}

impl Assignments {
    pub fn set_clause(&self) -> String {
        self.columns.join(", ")
    }

    fn push_text(&mut self, column: &str, field: &Field<String>) {
        self.push(column, field, |v| Arg::Text(v.clone()));
    }

    fn push_int(&mut self, column: &str, field: &Field<i64>) {
        self.push(column, field, |v| Arg::Int(*v));
    }

    fn push<T>(&mut self, column: &str, field: &Field<T>, to_arg: impl Fn(&T) -> Arg) {
        let arg = match field {
            Field::Absent => return,
            Field::Null => Arg::Null,
            Field::Value(v) => to_arg(v),
        };
        self.columns.push(format!("{column} = ?"));
        self.args.push(arg);
    }
}

/// Vehicle-side assignments, or `None` when no vehicle field is present.
pub fn vehicle_assignments(patch: &VehiclePatch) -> Option<Assignments> {
    let mut set = Assignments::default();
    set.push_text("reg_num", &patch.reg_num);
    set.push_text("mark", &patch.mark);
    set.push_text("model", &patch.model);
    set.push_int("year", &patch.year);
    if set.columns.is_empty() {
        None
    } else {
        Some(set)
    }
}

/// Owner-side assignments, or `None` when no owner field is present.
pub fn owner_assignments(patch: &OwnerPatch) -> Option<Assignments> {
    let mut set = Assignments::default();
    set.push_text("name", &patch.name);
    set.push_text("surname", &patch.surname);
    set.push_text("patronymic", &patch.patronymic);
    if set.columns.is_empty() {
        None
    } else {
        Some(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::YearRange;

    #[test]
    fn empty_filter_yields_unconditional_query() {
        let preds = filter_predicates(&Filter::default());
        assert!(preds.clauses.is_empty());
        assert!(preds.args.is_empty());
        assert_eq!(preds.where_clause(), "");
    }

    #[test]
    fn substring_filters_are_parameterized() {
        let filter = Filter {
            reg_num: Some("X123".to_string()),
            name: Some("Iva".to_string()),
            ..Filter::default()
        };
        let preds = filter_predicates(&filter);
        assert_eq!(
            preds.clauses,
            vec!["vehicles.reg_num LIKE ?", "owners.name LIKE ?"]
        );
        assert_eq!(
            preds.args,
            vec![
                Arg::Text("%X123%".to_string()),
                Arg::Text("%Iva%".to_string())
            ]
        );
        assert_eq!(
            preds.where_clause(),
            " WHERE vehicles.reg_num LIKE ? AND owners.name LIKE ?"
        );
    }

    #[test]
    fn malicious_filter_text_never_reaches_query_text() {
        let filter = Filter {
            model: Some("'; DROP TABLE vehicles; --".to_string()),
            ..Filter::default()
        };
        let preds = filter_predicates(&filter);
        assert_eq!(preds.clauses, vec!["vehicles.model LIKE ?"]);
        assert!(!preds.where_clause().contains("DROP"));
    }

    #[test]
    fn year_range_binds_both_bounds() {
        let filter = Filter {
            year: Some(YearRange {
                start: 2000,
                end: 2023,
            }),
            ..Filter::default()
        };
        let preds = filter_predicates(&filter);
        assert_eq!(preds.clauses, vec!["vehicles.year BETWEEN ? AND ?"]);
        assert_eq!(preds.args, vec![Arg::Int(2000), Arg::Int(2023)]);
    }

    #[test]
    fn assignments_skip_absent_fields() {
        let patch = VehiclePatch {
            mark: Field::Value("Lada".to_string()),
            year: Field::Null,
            ..VehiclePatch::default()
        };
        let set = vehicle_assignments(&patch).unwrap();
        assert_eq!(set.set_clause(), "mark = ?, year = ?");
        assert_eq!(
            set.args,
            vec![Arg::Text("Lada".to_string()), Arg::Null]
        );

        assert!(owner_assignments(&patch.owner).is_none());
    }

    #[test]
    fn all_absent_patch_produces_no_assignments() {
        assert!(vehicle_assignments(&VehiclePatch::default()).is_none());
        assert!(owner_assignments(&OwnerPatch::default()).is_none());
    }

    #[test]
    fn empty_string_is_a_real_assignment() {
        let patch = OwnerPatch {
            patronymic: Field::Value(String::new()),
            ..OwnerPatch::default()
        };
        let set = owner_assignments(&patch).unwrap();
        assert_eq!(set.set_clause(), "patronymic = ?");
        assert_eq!(set.args, vec![Arg::Text(String::new())]);
    }
}
