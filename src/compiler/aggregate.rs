//! Group-by stage construction

use serde_json::{json, Map, Value};

use super::compiler::QueryCompiler;
use crate::query::{Aggregate, GroupBy, QueryError, QueryResult};
use crate::schema::{ClassRegistry, FieldType};

impl<'a, R: ClassRegistry> QueryCompiler<'a, R> {
    /// `$group` body: `_id` is the grouped field, optionally truncated to a
    /// date unit, plus one accumulator named after the aggregate
    pub(crate) fn group_stage(&self, class_name: &str, group: &GroupBy) -> QueryResult<Map<String, Value>> {
        if group.field.is_empty() {
            return Err(QueryError::invalid_value("", "group_by", "group field must not be empty"));
        }

        let key = match group.date_unit {
            Some(unit) => {
                self.require_type(class_name, &group.field, "group_by", |t| *t == FieldType::Date)?;
                json!({ "$dateToString": { "format": unit.format(), "date": format!("${}", group.field) } })
            }
            None => json!(format!("${}", group.field)),
        };

        let mut spec = Map::new();
        spec.insert("_id".into(), key);

        let accumulator = match &group.aggregate {
            Aggregate::Count => Some(json!({ "$sum": 1 })),
            Aggregate::Distinct => None,
            Aggregate::Sum(f) | Aggregate::Average(f) | Aggregate::Min(f) | Aggregate::Max(f) => {
                if f.is_empty() {
                    return Err(QueryError::invalid_value(
                        &group.field,
                        "group_by",
                        "aggregate field must not be empty",
                    ));
                }
                let op = match &group.aggregate {
                    Aggregate::Sum(_) => "$sum",
                    Aggregate::Average(_) => "$avg",
                    Aggregate::Min(_) => "$min",
                    _ => "$max",
                };
                if matches!(group.aggregate, Aggregate::Sum(_) | Aggregate::Average(_)) {
                    self.require_type(class_name, f, op, |t| *t == FieldType::Number)?;
                }
                Some(json!({ op: format!("${}", f) }))
            }
        };
        if let Some(acc) = accumulator {
            spec.insert(group.aggregate.output_name().into(), acc);
        }
        Ok(spec)
    }

    /// Rejects known fields whose type fails `accepts`; unknown fields pass
    fn require_type(
        &self,
        class_name: &str,
        field: &str,
        operator: &str,
        accepts: impl Fn(&FieldType) -> bool,
    ) -> QueryResult<()> {
        match self.registry.field(class_name, field) {
            Some(def) if !accepts(&def.field_type) => Err(QueryError::operator_not_applicable(
                field,
                operator,
                def.field_type.type_name(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::acl::RoleGraph;
    use crate::compiler::{CompiledQuery, QueryCompiler, Stage};
    use crate::config::QueryConfig;
    use crate::query::{Aggregate, DateUnit, GroupBy, Query, QueryErrorCode, QueryResult};
    use crate::schema::{ClassSchema, FieldDef, FieldType, SchemaCatalog};
    use serde_json::{json, Value};

    fn group(query: Query) -> QueryResult<Value> {
        let config = QueryConfig::default();
        let registry = SchemaCatalog::new()
            .with_class(
                ClassSchema::new("Order")
                    .with_field("total", FieldDef::new(FieldType::Number))
                    .with_field("status", FieldDef::new(FieldType::String))
                    .with_field("placedAt", FieldDef::new(FieldType::Date)),
            )
            .unwrap();
        let roles = RoleGraph::new();
        let compiled = QueryCompiler::new(&config, &registry, &roles).compile(&query)?;
        let CompiledQuery::Pipeline(pipeline) = compiled else {
            panic!("grouping must compile to a pipeline");
        };
        let stage = pipeline
            .stages
            .iter()
            .find(|s| matches!(s, Stage::Group(_)))
            .unwrap();
        Ok(stage.to_json()["$group"].clone())
    }

    #[test]
    fn test_count_by_field() {
        let value = group(Query::new("Order").group_by(GroupBy::new("status", Aggregate::Count))).unwrap();
        assert_eq!(value, json!({"_id": "$status", "count": {"$sum": 1}}));
    }

    #[test]
    fn test_average_min_max() {
        let avg = group(Query::new("Order").group_by(GroupBy::new("status", Aggregate::Average("total".into())))).unwrap();
        assert_eq!(avg["avg"], json!({"$avg": "$total"}));

        let min = group(Query::new("Order").group_by(GroupBy::new("status", Aggregate::Min("placedAt".into())))).unwrap();
        assert_eq!(min["min"], json!({"$min": "$placedAt"}));

        let max = group(Query::new("Order").group_by(GroupBy::new("status", Aggregate::Max("total".into())))).unwrap();
        assert_eq!(max["max"], json!({"$max": "$total"}));
    }

    #[test]
    fn test_distinct_has_no_accumulator() {
        let value = group(Query::new("Order").group_by(GroupBy::new("status", Aggregate::Distinct))).unwrap();
        assert_eq!(value, json!({"_id": "$status"}));
    }

    #[test]
    fn test_group_by_day_and_year() {
        let day = group(
            Query::new("Order").group_by(GroupBy::new("placedAt", Aggregate::Count).by_date(DateUnit::Day)),
        )
        .unwrap();
        assert_eq!(day["_id"]["$dateToString"]["format"], json!("%Y-%m-%d"));

        let year = group(
            Query::new("Order").group_by(GroupBy::new("placedAt", Aggregate::Count).by_date(DateUnit::Year)),
        )
        .unwrap();
        assert_eq!(year["_id"]["$dateToString"]["format"], json!("%Y"));
    }

    #[test]
    fn test_date_unit_on_non_date_rejected() {
        let err = group(
            Query::new("Order").group_by(GroupBy::new("status", Aggregate::Count).by_date(DateUnit::Day)),
        )
        .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::AeroqOperatorNotApplicable);
    }

    #[test]
    fn test_sum_on_string_rejected() {
        let err = group(Query::new("Order").group_by(GroupBy::new("status", Aggregate::Sum("status".into()))))
            .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::AeroqOperatorNotApplicable);
    }
}
