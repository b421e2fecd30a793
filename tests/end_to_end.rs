//! Integration tests covering the concrete end-to-end scenarios from
//! SPEC_FULL.md §8: a filing is read through `InstanceReader`, matched
//! against a compiled `TableSchema` by `FactProjector`, and the resulting
//! rows are checked against the invariants those scenarios describe.

use xbrl_tabulator::instance;
use xbrl_tabulator::projector::{self, Cell};
use xbrl_tabulator::schema::SchemaCompiler;
use xbrl_tabulator::taxonomy::provider::FileTaxonomyProvider;
use xbrl_tabulator::taxonomy::provider::TaxonomyProvider;
use xbrl_tabulator::taxonomy::TaxonomyModel;

const MANIFEST: &str = r#"
    [[concept]]
    name = "root"
    data_type = "string"
    period_type = "instant"

    [[concept]]
    name = "us-gaap:Assets"
    data_type = "monetary"
    period_type = "instant"

    [[concept]]
    name = "us-gaap:Revenues"
    data_type = "monetary"
    period_type = "duration"

    [[role]]
    uri = "urn:balance-sheet"
    name = "Balance Sheet"
    root = "root"
    axes_in_scope = ["PlantName"]

    [[role.arcs]]
    parent = "root"
    child = "us-gaap:Assets"

    [[role.arcs]]
    parent = "root"
    child = "us-gaap:Revenues"

    [[axis]]
    kind = "explicit"
    name = "PlantName"
    domain = ["Alpha", "Beta"]

    [[concept]]
    name = "root2"
    data_type = "string"
    period_type = "instant"

    [[concept]]
    name = "us-gaap:Cash"
    data_type = "monetary"
    period_type = "instant"

    [[role]]
    uri = "urn:cash"
    name = "Cash"
    root = "root2"

    [[role.arcs]]
    parent = "root2"
    child = "us-gaap:Cash"
"#;

fn compiled_model() -> TaxonomyModel {
    let provider = FileTaxonomyProvider::from_str(MANIFEST).unwrap();
    TaxonomyModel::compile(provider.concepts().unwrap(), provider.link_roles().unwrap(), provider.axes().unwrap()).unwrap()
}

#[test]
fn minimal_taxonomy_and_filing_round_trip() {
    let model = compiled_model();
    let (tables, _) = SchemaCompiler::compile(&model).unwrap();
    let cash = tables.iter().find(|t| t.name == "cash_instant").unwrap();

    let doc = r#"
        <xbrli:xbrl>
          <xbrli:context id="c1">
            <xbrli:entity><xbrli:identifier>E1</xbrli:identifier></xbrli:entity>
            <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <us-gaap:Cash contextRef="c1">1000000</us-gaap:Cash>
        </xbrli:xbrl>
    "#;

    let document = instance::read(doc.as_bytes(), &model.concepts).unwrap();
    let rows: Vec<_> = projector::project(cash, &document.facts, &document.contexts, "E1", "filing-1", "2024-01-01T00:00:00Z").collect();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].data, vec![Cell::Float64(1_000_000.0)]);
}

#[test]
fn fact_with_no_axes_does_not_match_an_axis_scoped_table() {
    let model = compiled_model();
    let (tables, _) = SchemaCompiler::compile(&model).unwrap();
    let instant = tables.iter().find(|t| t.name == "balance_sheet_instant").unwrap();

    let doc = r#"
        <xbrli:xbrl>
          <xbrli:context id="c1">
            <xbrli:entity><xbrli:identifier>E1</xbrli:identifier></xbrli:entity>
            <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <us-gaap:Assets contextRef="c1">1000000</us-gaap:Assets>
        </xbrli:xbrl>
    "#;

    let document = instance::read(doc.as_bytes(), &model.concepts).unwrap();
    let rows: Vec<_> = projector::project(instant, &document.facts, &document.contexts, "E1", "filing-1", "2024-01-01T00:00:00Z").collect();

    // A fact with no dimensional signature does not match a table whose
    // axes_in_scope is non-empty -- set-equality is strict.
    assert!(rows.is_empty());
}

#[test]
fn axis_scoped_fact_matches_axis_scoped_table() {
    let model = compiled_model();
    let (tables, _) = SchemaCompiler::compile(&model).unwrap();
    let instant = tables.iter().find(|t| t.name == "balance_sheet_instant").unwrap();

    let doc = r#"
        <xbrli:xbrl>
          <xbrli:context id="c1">
            <xbrli:entity>
              <xbrli:identifier>E1</xbrli:identifier>
              <xbrli:segment>
                <xbrldi:explicitMember dimension="PlantName">Alpha</xbrldi:explicitMember>
              </xbrli:segment>
            </xbrli:entity>
            <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <us-gaap:Assets contextRef="c1">1000000</us-gaap:Assets>
        </xbrli:xbrl>
    "#;

    let document = instance::read(doc.as_bytes(), &model.concepts).unwrap();
    let rows: Vec<_> = projector::project(instant, &document.facts, &document.contexts, "E1", "filing-1", "2024-01-01T00:00:00Z").collect();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].data, vec![Cell::Float64(1_000_000.0)]);
    // last primary-key cell is the plant_name_axis column
    assert_eq!(rows[0].primary_key.last(), Some(&Cell::Str("Alpha".to_string())));
}

#[test]
fn extra_axis_on_the_fact_breaks_the_match() {
    let model = compiled_model();
    let (tables, _) = SchemaCompiler::compile(&model).unwrap();
    let instant = tables.iter().find(|t| t.name == "balance_sheet_instant").unwrap();

    let mut facts = instance::FactIndex::new();
    let mut contexts = instance::ContextIndex::new();
    contexts.insert(
        "c1".to_string(),
        instance::Context {
            id: "c1".to_string(),
            entity_id: "E1".to_string(),
            period: instance::Period::Instant(chrono::NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()),
            signature: vec![("PlantName".to_string(), "Alpha".to_string()), ("ExtraAxis".to_string(), "Z".to_string())],
        },
    );
    facts.insert(
        vec![("ExtraAxis".to_string(), "Z".to_string()), ("PlantName".to_string(), "Alpha".to_string())],
        vec![instance::Fact {
            concept: "us-gaap:Assets".to_string(),
            context_id: "c1".to_string(),
            raw_value: "1".to_string(),
            data_type: xbrl_tabulator::taxonomy::PrimitiveType::Monetary,
            document_order: 0,
        }],
    );

    let rows: Vec<_> = projector::project(instant, &facts, &contexts, "E1", "filing-1", "2024-01-01T00:00:00Z").collect();
    assert!(rows.is_empty(), "a fact with more axes than the table requires must not match");
}

#[test]
fn duplicate_fact_in_document_order_keeps_the_last_one() {
    let model = compiled_model();
    let (tables, _) = SchemaCompiler::compile(&model).unwrap();
    let instant = tables.iter().find(|t| t.name == "balance_sheet_instant").unwrap();

    let doc = r#"
        <xbrli:xbrl>
          <xbrli:context id="c1">
            <xbrli:entity>
              <xbrli:identifier>E1</xbrli:identifier>
              <xbrli:segment>
                <xbrldi:explicitMember dimension="PlantName">Alpha</xbrldi:explicitMember>
              </xbrli:segment>
            </xbrli:entity>
            <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <us-gaap:Assets contextRef="c1">111</us-gaap:Assets>
          <us-gaap:Assets contextRef="c1">222</us-gaap:Assets>
        </xbrli:xbrl>
    "#;

    let document = instance::read(doc.as_bytes(), &model.concepts).unwrap();
    let mut projected = projector::project(instant, &document.facts, &document.contexts, "E1", "filing-1", "2024-01-01T00:00:00Z");
    let row = projected.next().unwrap();
    assert_eq!(row.data, vec![Cell::Float64(222.0)]);
    assert_eq!(projected.counters.duplicate_fact_dropped, 1);
}

#[test]
fn publication_time_distinguishes_otherwise_identical_rows() {
    let model = compiled_model();
    let (tables, _) = SchemaCompiler::compile(&model).unwrap();
    let instant = tables.iter().find(|t| t.name == "balance_sheet_instant").unwrap();

    let doc = r#"
        <xbrli:xbrl>
          <xbrli:context id="c1">
            <xbrli:entity>
              <xbrli:identifier>E1</xbrli:identifier>
              <xbrli:segment>
                <xbrldi:explicitMember dimension="PlantName">Alpha</xbrldi:explicitMember>
              </xbrli:segment>
            </xbrli:entity>
            <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <us-gaap:Assets contextRef="c1">100</us-gaap:Assets>
        </xbrli:xbrl>
    "#;
    let earlier = instance::read(doc.as_bytes(), &model.concepts).unwrap();

    let doc2 = doc.replace("100", "200");
    let later = instance::read(doc2.as_bytes(), &model.concepts).unwrap();

    let row_f1: Vec<_> = projector::project(instant, &earlier.facts, &earlier.contexts, "E1", "filing-1", "2024-01-01T00:00:00Z").collect();
    let row_f2: Vec<_> = projector::project(instant, &later.facts, &later.contexts, "E1", "filing-2", "2024-06-01T00:00:00Z").collect();

    assert_eq!(row_f1[0].data, vec![Cell::Float64(100.0)]);
    assert_eq!(row_f2[0].data, vec![Cell::Float64(200.0)]);
    // Distinct publication_time cells keep the two filings' rows separate.
    assert_ne!(row_f1[0].primary_key[2], row_f2[0].primary_key[2]);
}

#[test]
fn malformed_context_is_rejected_without_panicking() {
    let model = compiled_model();

    let doc = r#"
        <xbrli:xbrl>
          <xbrli:context id="bad">
            <xbrli:entity><xbrli:identifier>E1</xbrli:identifier></xbrli:entity>
            <xbrli:period></xbrli:period>
          </xbrli:context>
          <us-gaap:Assets contextRef="bad">1</us-gaap:Assets>
        </xbrli:xbrl>
    "#;

    let err = instance::read(doc.as_bytes(), &model.concepts).unwrap_err();
    assert!(matches!(err, xbrl_tabulator::errors::InstanceError::ContextMalformed(_, _)));
}

#[test]
fn unknown_elements_are_skipped_not_fatal() {
    let model = compiled_model();
    let doc = r#"
        <xbrli:xbrl>
          <xbrli:context id="c1">
            <xbrli:entity><xbrli:identifier>E1</xbrli:identifier></xbrli:entity>
            <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
          </xbrli:context>
          <other:Unrecognized contextRef="c1">noise</other:Unrecognized>
          <us-gaap:Assets contextRef="c1">5</us-gaap:Assets>
        </xbrli:xbrl>
    "#;
    let document = instance::read(doc.as_bytes(), &model.concepts).unwrap();
    assert_eq!(document.counters.skipped_concepts, 1);

    let empty_signature: Vec<(String, String)> = Vec::new();
    assert_eq!(document.facts[&empty_signature].len(), 1);
}
