//! End-to-end validation tests against the built-in style trade contracts

use pretty_assertions::assert_eq;
use tradeboard_core::{
    ColumnSpec, ColumnType, ContractDefinition, IssueCode, RowRule, SchemaContract, Severity,
    Value, Verdict,
};
use tradeboard_validate::{RawInput, Validator};

fn shipments_contract() -> SchemaContract {
    let toml = r#"
        version = 2
        key = ["job_no"]

        [[columns]]
        name = "job_no"
        type = "text"
        nullable = false

        [[columns]]
        name = "exporter"
        type = "text"

        [[columns]]
        name = "kgs"
        type = "numeric"

        [[columns]]
        name = "shipped"
        type = "date"
        required = false

        [[rules]]
        kind = "non_negative"
        column = "kgs"
    "#;
    let definition: ContractDefinition = toml::from_str(toml).unwrap();
    SchemaContract::new("shipments", definition).unwrap()
}

#[test]
fn contract_from_toml_validates_clean_upload() {
    let input = RawInput::new(
        "upload-1",
        b"job_no,exporter,kgs\nJ1,Acme,\"12,500\"\nJ2,Globex,NA\n".to_vec(),
        "shipments",
    );

    let checked = Validator::new().check(&input, &shipments_contract()).unwrap();

    assert_eq!(checked.report.verdict, Verdict::Pass);
    assert_eq!(checked.report.summary.rows_checked, 2);

    let dataset = checked.dataset.unwrap();
    assert_eq!(dataset.column_names(), vec!["job_no", "exporter", "kgs", "shipped"]);
    assert_eq!(dataset.row(0)[2], Value::Numeric(12_500.0));
    assert_eq!(dataset.row(1)[2], Value::Null);
    assert_eq!(dataset.column("shipped").unwrap().data.null_count(), 2);
}

#[test]
fn every_problem_is_reported_in_one_pass() {
    let input = RawInput::new(
        "upload-2",
        b"job_no,exporter,kgs,shipped\nJ1,Acme,-4,2024-01-01\n,Globex,ten,2024-13-01\nJ1,Initech,3,\n"
            .to_vec(),
        "shipments",
    );

    let report = Validator::new().validate(&input, &shipments_contract()).unwrap();

    assert_eq!(report.verdict, Verdict::Fail);
    let codes: Vec<_> = report.issues.iter().map(|i| i.code).collect();
    assert_eq!(
        codes,
        vec![
            IssueCode::TypeMismatch,
            IssueCode::TypeMismatch,
            IssueCode::NullValue,
            IssueCode::OutOfRange,
            IssueCode::DuplicateKey,
        ]
    );
    assert_eq!(report.issues_for_column("kgs").count(), 2);
}

#[test]
fn report_serializes_with_stable_codes() {
    let contract = SchemaContract::builder("supplier")
        .column(ColumnSpec::new("supplier", ColumnType::Text))
        .column(ColumnSpec::new("qty", ColumnType::Numeric))
        .column(ColumnSpec::new("date", ColumnType::Date))
        .rule(RowRule::NonNegative {
            column: "qty".into(),
            severity: Severity::Error,
        })
        .build()
        .unwrap();

    let input = RawInput::from_bytes(
        b"supplier,qty,date\nAcme,10,2024-01-05\nGlobex,abc,2024-01-06\n".to_vec(),
        "supplier",
    );
    let report = Validator::new().validate(&input, &contract).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["verdict"], "fail");
    assert_eq!(json["issues"][0]["code"], "TYPE_MISMATCH");
    assert_eq!(json["issues"][0]["location"]["row"], 2);
    assert_eq!(json["issues"][0]["location"]["column"], "qty");
}
