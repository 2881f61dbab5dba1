//! IFC → tabular lift
//!
//! Walks the parsed entity table the same way every time:
//! 1. containment edges (aggregation, then spatial containment) → closure,
//! 2. one property bag per `IFCRELDEFINESBYPROPERTIES`, ascending id,
//! 3. one row per element, in [`ELEMENTS`] order, with its bags merged.

use std::collections::{BTreeMap, HashMap};

use ifcx_model::closure::push_edges;
use ifcx_model::guid::global_id_to_guid;
use ifcx_model::schema::IDENTITY_COLUMNS;
use ifcx_model::{build_closure, Adjacency, ColumnId, Row, SchemaInference, TabularModel, Value};

use crate::elements::{tag_index, ELEMENTS};
use crate::{IfcModel, StepEntity, StepError, StepValue};

const REL_AGGREGATES: &str = "IFCRELAGGREGATES";
const REL_CONTAINED: &str = "IFCRELCONTAINEDINSPATIALSTRUCTURE";
const REL_DEFINES_BY_PROPERTIES: &str = "IFCRELDEFINESBYPROPERTIES";

type Bag = Vec<(ColumnId, Value)>;

/// Parent → children edges from aggregation and spatial containment.
///
/// Edges for one parent are appended in relationship order, aggregation
/// relationships first.
pub fn hierarchy(model: &IfcModel) -> Adjacency {
    let mut adjacency = Adjacency::new();

    // IfcRelAggregates: RelatingObject (4) → RelatedObjects (5)
    for &id in model.ids_of_type(REL_AGGREGATES) {
        let Some(rel) = model.get(id) else { continue };
        match rel.ref_attr(4) {
            Some(parent) => push_edges(&mut adjacency, parent, rel.ref_list(5)),
            None => tracing::warn!(id, "aggregation without a relating object"),
        }
    }

    // IfcRelContainedInSpatialStructure: RelatingStructure (5) → RelatedElements (4)
    for &id in model.ids_of_type(REL_CONTAINED) {
        let Some(rel) = model.get(id) else { continue };
        match rel.ref_attr(5) {
            Some(parent) => push_edges(&mut adjacency, parent, rel.ref_list(4)),
            None => tracing::warn!(id, "spatial containment without a relating structure"),
        }
    }

    adjacency
}

/// Scalar cell value of a STEP attribute.
pub fn to_value(value: &StepValue) -> Value {
    match value {
        StepValue::Typed(_, inner) => to_value(inner),
        StepValue::Integer(i) => Value::Int(*i),
        StepValue::Real(f) => Value::Real(*f),
        StepValue::String(s) | StepValue::Binary(s) => Value::Text(s.clone()),
        StepValue::Enum(e) => match e.as_str() {
            "T" | "TRUE" => Value::Bool(true),
            "F" | "FALSE" => Value::Bool(false),
            "U" | "UNKNOWN" => Value::Null,
            other => Value::Text(other.to_string()),
        },
        StepValue::Null | StepValue::Derived | StepValue::Reference(_) | StepValue::List(_) => {
            Value::Null
        }
    }
}

fn enumerated_value(value: Option<&StepValue>) -> Value {
    let Some(StepValue::List(items)) = value else {
        return Value::Null;
    };
    let parts: Vec<String> = items
        .iter()
        .filter_map(|item| match to_value(item) {
            Value::Null => None,
            Value::Text(s) => Some(s),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
        })
        .collect();
    if parts.is_empty() {
        Value::Null
    } else {
        Value::Text(parts.join(", "))
    }
}

/// Observe every property or quantity of one definition and return the bag.
fn property_bag(model: &IfcModel, definition: &StepEntity, engine: &mut SchemaInference) -> Bag {
    let Some(set_name) = definition.str_attr(2) else {
        tracing::debug!(id = definition.id, "property definition without a name");
        return Bag::new();
    };

    let mut bag = Bag::new();
    let mut push = |name: &str, value: Value| {
        let column = engine.observe(&format!("{set_name}_{name}"), &value);
        bag.push((column, value));
    };

    match definition.type_name.as_str() {
        // IfcPropertySet.HasProperties (4)
        "IFCPROPERTYSET" => {
            for prop in definition.ref_list(4).into_iter().filter_map(|id| model.get(id)) {
                let Some(name) = prop.str_attr(0) else { continue };
                let value = match prop.type_name.as_str() {
                    "IFCPROPERTYSINGLEVALUE" => prop.attr(2).map(to_value).unwrap_or(Value::Null),
                    "IFCPROPERTYENUMERATEDVALUE" => enumerated_value(prop.attr(2)),
                    _ => continue,
                };
                push(name, value);
            }
        }
        // IfcElementQuantity.Quantities (5)
        "IFCELEMENTQUANTITY" => {
            for quantity in definition.ref_list(5).into_iter().filter_map(|id| model.get(id)) {
                let Some(name) = quantity.str_attr(0) else { continue };
                let value = if quantity.type_name.starts_with("IFCQUANTITY") {
                    quantity.attr(3).map(to_value).unwrap_or(Value::Null)
                } else {
                    Value::Null
                };
                // Missing measures read as zero.
                let value = if value.is_null() { Value::Int(0) } else { value };
                push(name, value);
            }
        }
        other => tracing::debug!(id = definition.id, type_name = other, "unsupported property definition"),
    }

    bag
}

fn set_text(row: &mut Row, column: ColumnId, value: Option<&str>) {
    if let Some(text) = value {
        row.set(column, Value::from(text));
    }
}

/// Lift a parsed IFC model into the tabular shape.
///
/// `progress` receives `processed / total` after every property relationship
/// and every row, so it is non-decreasing and ends at 1 when there is work.
/// A malformed `GlobalId` on a row-producing entity aborts the lift.
pub fn lift_tabular(
    model: &IfcModel,
    progress: &mut dyn FnMut(f64),
) -> Result<TabularModel, StepError> {
    let relations = build_closure(&hierarchy(model));

    let definitions = model.ids_of_type(REL_DEFINES_BY_PROPERTIES);
    let total = definitions.len()
        + ELEMENTS
            .iter()
            .map(|t| model.ids_of_type(t).len())
            .sum::<usize>();
    let mut processed = 0usize;
    let mut tick = |processed: usize| progress(processed as f64 / total.max(1) as f64);
    tick(0);

    let mut engine = SchemaInference::with_identity_columns();
    let [express_id, type_col, global_id_col, guid_col, name_col, description_col, tag_col] =
        IDENTITY_COLUMNS.map(|(name, column_type)| engine.declare(name, column_type));

    // IfcRelDefinesByProperties: RelatedObjects (4), RelatingPropertyDefinition (5)
    let mut bags: BTreeMap<u64, Bag> = BTreeMap::new();
    let mut defined_by: HashMap<u64, Vec<u64>> = HashMap::new();
    for &rel_id in definitions {
        processed += 1;
        tick(processed);

        let Some(rel) = model.get(rel_id) else { continue };
        let bag = match rel.ref_attr(5).and_then(|id| model.get(id)) {
            Some(definition) => property_bag(model, definition, &mut engine),
            None => Bag::new(),
        };
        for object in rel.ref_list(4) {
            defined_by.entry(object).or_default().push(rel_id);
        }
        bags.insert(rel_id, bag);
    }

    for &type_name in ELEMENTS {
        for &id in model.ids_of_type(type_name) {
            processed += 1;
            tick(processed);

            let Some(entity) = model.get(id) else { continue };
            let mut row = Row::new();
            row.set(express_id, Value::Int(id as i64));
            row.set(type_col, Value::from(type_name));

            match entity.str_attr(0) {
                Some(global_id) => {
                    let guid = global_id_to_guid(global_id).map_err(|source| StepError::GlobalId {
                        id,
                        type_name: type_name.to_string(),
                        source,
                    })?;
                    row.set(global_id_col, Value::from(global_id));
                    row.set(guid_col, Value::from(guid));
                }
                None => tracing::warn!(id, type_name, "element without a GlobalId"),
            }
            set_text(&mut row, name_col, entity.str_attr(2));
            set_text(&mut row, description_col, entity.str_attr(3));
            if let Some(index) = tag_index(type_name) {
                set_text(&mut row, tag_col, entity.str_attr(index));
            }

            // Later relationships overwrite earlier ones column by column.
            for bag in defined_by
                .get(&id)
                .into_iter()
                .flatten()
                .filter_map(|rel_id| bags.get(rel_id))
            {
                for (column, value) in bag {
                    row.set(*column, value.clone());
                }
            }

            engine.insert_row(id, row);
        }
    }

    tracing::debug!(
        rows = engine.row_count(),
        relations = relations.len(),
        "lifted IFC model"
    );
    Ok(engine.finish(relations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifcx_model::ColumnType;

    const FIXTURE: &str = r#"ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('0YvctVUKr0kugbFTf53O9L',$,'Project',$,$,$,$,$,$);
#2=IFCBUILDING('1hOSvn6df7F8_7GcBWlR72',$,'Building','Main',$,$,$,$,.ELEMENT.,$,$,$);
#3=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'Wall',$,$,$,$,'W-01',$);
#10=IFCRELAGGREGATES('3vB2YO$MX4xv5uCqZZG05x',$,$,$,#1,(#2));
#11=IFCRELCONTAINEDINSPATIALSTRUCTURE('1Bz6_MdKj0ZQSOJ$8rXkH1',$,$,$,(#3),#2);
#20=IFCPROPERTYSINGLEVALUE('IsExternal',$,IFCBOOLEAN(.T.),$);
#21=IFCPROPERTYSINGLEVALUE('Height',$,IFCLENGTHMEASURE(3.5),$);
#22=IFCPROPERTYSET('2sR$1a8Ff0xQ8vCk9n0u5T',$,'Pset_Common',$,(#20,#21));
#23=IFCRELDEFINESBYPROPERTIES('0Qb9Jd6Ab4HfXl3t8cVwKz',$,$,$,(#2),#22);
#30=IFCQUANTITYLENGTH('Width',$,$,$,$);
#31=IFCQUANTITYAREA('Area',$,$,12.,$);
#32=IFCELEMENTQUANTITY('1u1d3H8QL4dAc9ZLnOWMcb',$,'Qto',$,$,(#30,#31));
#33=IFCRELDEFINESBYPROPERTIES('3kE0x9oLz5ExvV4$Gm2Bn0',$,$,$,(#3),#32);
#40=IFCPROPERTYSINGLEVALUE('Unused',$,$,$);
#41=IFCPROPERTYSET('0kF8p7Zd96GBs3dJvKq9lO',$,'Pset_Empty',$,(#40));
#42=IFCRELDEFINESBYPROPERTIES('2aG1gZj7PD2PJH1r6LpC0d',$,$,$,(#3),#41);
ENDSEC;
END-ISO-10303-21;"#;

    fn lift(src: &str) -> (TabularModel, Vec<f64>) {
        let model = IfcModel::parse(src.as_bytes()).unwrap();
        let mut seen = Vec::new();
        let tabular = lift_tabular(&model, &mut |p| seen.push(p)).unwrap();
        (tabular, seen)
    }

    #[test]
    fn test_rows_and_identity_columns() {
        let (tabular, _) = lift(FIXTURE);
        assert_eq!(tabular.row_count(), 3);
        assert_eq!(tabular.cell(1, "Type"), Some(&Value::Text("IFCPROJECT".into())));
        assert_eq!(tabular.cell(3, "ExpressID"), Some(&Value::Int(3)));
        assert_eq!(tabular.cell(3, "Tag"), Some(&Value::Text("W-01".into())));
        assert_eq!(tabular.cell(2, "Description"), Some(&Value::Text("Main".into())));
        // IfcBuilding's attribute 7 is LongName, not Tag.
        assert_eq!(tabular.cell(2, "Tag"), None);
        assert_eq!(
            tabular.cell(2, "GUID"),
            Some(&Value::Text(global_id_to_guid("1hOSvn6df7F8_7GcBWlR72").unwrap()))
        );
    }

    #[test]
    fn test_property_and_quantity_columns() {
        let (tabular, _) = lift(FIXTURE);
        let schema = &tabular.schema;
        assert_eq!(schema.type_of("Pset_Common_IsExternal"), Some(ColumnType::Boolean));
        assert_eq!(schema.type_of("Pset_Common_Height"), Some(ColumnType::Real));
        assert_eq!(schema.type_of("Qto_Width"), Some(ColumnType::Integer));
        assert_eq!(schema.type_of("Qto_Area"), Some(ColumnType::Integer));
        // Only ever null.
        assert_eq!(schema.type_of("Pset_Empty_Unused"), None);

        assert_eq!(tabular.cell(2, "Pset_Common_IsExternal"), Some(&Value::Int(1)));
        assert_eq!(tabular.cell(2, "Pset_Common_Height"), Some(&Value::Real(3.5)));
        assert_eq!(tabular.cell(3, "Qto_Width"), Some(&Value::Int(0)));
        assert_eq!(tabular.cell(3, "Qto_Area"), Some(&Value::Int(12)));
        assert_eq!(tabular.cell(3, "Pset_Common_Height"), None);

        let names: Vec<&str> = tabular.column_names().collect();
        assert_eq!(
            &names[..7],
            &["ExpressID", "Type", "GlobalId", "GUID", "Name", "Description", "Tag"]
        );
        assert_eq!(names.len(), 11);
    }

    #[test]
    fn test_relations_follow_containment() {
        let (tabular, _) = lift(FIXTURE);
        let triples: Vec<(u64, u64, u32)> = tabular
            .relations
            .iter()
            .map(|e| (e.ancestor, e.descendant, e.depth))
            .collect();
        assert_eq!(
            triples,
            vec![
                (1, 1, 0),
                (1, 2, 1),
                (1, 3, 2),
                (2, 2, 0),
                (2, 3, 1),
                (3, 3, 0)
            ]
        );
    }

    #[test]
    fn test_progress_is_monotonic_and_complete() {
        let (_, seen) = lift(FIXTURE);
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        // 3 property relationships + 3 rows, plus the initial report.
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn test_later_bag_overwrites_earlier() {
        let src = r#"ISO-10303-21;HEADER;ENDSEC;DATA;
#1=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'Wall',$,$,$,$,$,$);
#2=IFCPROPERTYSINGLEVALUE('Rating',$,IFCLABEL('low'),$);
#3=IFCPROPERTYSET('2sR$1a8Ff0xQ8vCk9n0u5T',$,'Pset',$,(#2));
#4=IFCRELDEFINESBYPROPERTIES('0Qb9Jd6Ab4HfXl3t8cVwKz',$,$,$,(#1),#3);
#5=IFCPROPERTYSINGLEVALUE('Rating',$,IFCLABEL('high'),$);
#6=IFCPROPERTYSET('0kF8p7Zd96GBs3dJvKq9lO',$,'Pset',$,(#5));
#7=IFCRELDEFINESBYPROPERTIES('2aG1gZj7PD2PJH1r6LpC0d',$,$,$,(#1),#6);
ENDSEC;END-ISO-10303-21;"#;
        let (tabular, _) = lift(src);
        assert_eq!(tabular.cell(1, "Pset_Rating"), Some(&Value::Text("high".into())));
    }

    #[test]
    fn test_malformed_global_id_is_an_error() {
        let src = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=IFCWALL('short',$,$,$,$,$,$,$,$);ENDSEC;END-ISO-10303-21;";
        let model = IfcModel::parse(src.as_bytes()).unwrap();
        let err = lift_tabular(&model, &mut |_| {}).unwrap_err();
        assert!(matches!(err, StepError::GlobalId { id: 1, .. }));
    }
}
