//! Tests for the command-line surface.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<schema-report>
  <table-def name="ORG_UNIT">
    <table-schema>HR</table-schema>
    <table-name>ORG_UNIT</table-name>
    <disposed>false</disposed>
    <primary-key-name>PK_ORG_UNIT</primary-key-name>
    <column-def>
      <column-name>ID</column-name>
      <java-sql-type>4</java-sql-type>
      <dbms-data-type>INTEGER</dbms-data-type>
      <dbms-data-size>10</dbms-data-size>
      <primary-key>true</primary-key>
    </column-def>
    <column-def>
      <column-name>PARENT_ID</column-name>
      <java-sql-type>4</java-sql-type>
      <dbms-data-size>10</dbms-data-size>
      <primary-key>false</primary-key>
      <references>
        <table-name>ORG_UNIT</table-name>
        <column-name>ID</column-name>
        <constraint-name>FK_ORG_UNIT_PARENT</constraint-name>
      </references>
    </column-def>
    <column-def>
      <column-name>NAME</column-name>
      <java-sql-type>12</java-sql-type>
      <dbms-data-size>100</dbms-data-size>
      <primary-key>false</primary-key>
    </column-def>
    <index-def>
      <name>PK_ORG_UNIT</name>
      <unique>true</unique>
      <primary-key>true</primary-key>
      <column-list>
        <column name="ID"/>
      </column-list>
    </index-def>
    <foreign-keys>
      <foreign-key>
        <constraint-name>FK_ORG_UNIT_PARENT</constraint-name>
        <references>
          <table-name>ORG_UNIT</table-name>
          <table-schema>HR</table-schema>
        </references>
        <source-columns>
          <column>PARENT_ID</column>
        </source-columns>
        <referenced-columns>
          <column>ID</column>
        </referenced-columns>
      </foreign-key>
    </foreign-keys>
  </table-def>
  <table-def name="PERSON">
    <table-schema>HR</table-schema>
    <table-name>PERSON</table-name>
    <disposed>false</disposed>
    <column-def>
      <column-name>ID</column-name>
      <java-sql-type>4</java-sql-type>
      <dbms-data-size>10</dbms-data-size>
      <primary-key>true</primary-key>
    </column-def>
    <column-def>
      <column-name>UNIT_ID</column-name>
      <java-sql-type>4</java-sql-type>
      <dbms-data-size>10</dbms-data-size>
      <primary-key>false</primary-key>
      <references>
        <table-name>ORG_UNIT</table-name>
        <column-name>ID</column-name>
        <constraint-name>FK_PERSON_UNIT</constraint-name>
      </references>
    </column-def>
    <foreign-keys>
      <foreign-key>
        <constraint-name>FK_PERSON_UNIT</constraint-name>
        <references>
          <table-name>ORG_UNIT</table-name>
          <table-schema>HR</table-schema>
        </references>
        <source-columns>
          <column>UNIT_ID</column>
        </source-columns>
        <referenced-columns>
          <column>ID</column>
        </referenced-columns>
      </foreign-key>
    </foreign-keys>
  </table-def>
  <table-def name="AUDIT_LOG">
    <table-schema>HR</table-schema>
    <table-name>AUDIT_LOG</table-name>
    <disposed>true</disposed>
    <column-def>
      <column-name>ID</column-name>
      <java-sql-type>4</java-sql-type>
      <dbms-data-size>10</dbms-data-size>
      <primary-key>true</primary-key>
    </column-def>
  </table-def>
</schema-report>
"#;

const ORG_UNIT_TSV: &str = "ID\tPARENT_ID\tNAME\n10\t20\tSales\n20\t\tHead office\n30\t10\tSales north\n";

const PERSON_TSV: &str = "ID\tUNIT_ID\n1\t10\n2\t30\n";

/// A package on disk; keep the TempDir alive for the test's duration
struct Package {
    dir: TempDir,
    metadata: PathBuf,
    header: PathBuf,
    data: PathBuf,
}

fn package_with(metadata: &str) -> Package {
    let dir = TempDir::new().unwrap();
    let header = dir.path().join("header");
    let data = dir.path().join("content").join("data");
    fs::create_dir_all(&header).unwrap();
    fs::create_dir_all(&data).unwrap();

    let metadata_path = header.join("metadata.xml");
    fs::write(&metadata_path, metadata).unwrap();

    Package {
        dir,
        metadata: metadata_path,
        header,
        data,
    }
}

fn package() -> Package {
    let pkg = package_with(METADATA);
    fs::write(pkg.data.join("ORG_UNIT.tsv"), ORG_UNIT_TSV).unwrap();
    fs::write(pkg.data.join("PERSON.tsv"), PERSON_TSV).unwrap();
    pkg
}

/// Minimal table-def XML with foreign keys to the given targets
fn table_xml(name: &str, targets: &[&str]) -> String {
    let mut fks = String::new();
    for target in targets {
        fks.push_str(&format!(
            "<foreign-key><constraint-name>FK_{name}_{target}</constraint-name>\
             <references><table-name>{target}</table-name></references>\
             <source-columns><column>{target}_ID</column></source-columns>\
             <referenced-columns><column>ID</column></referenced-columns></foreign-key>"
        ));
    }
    let mut columns = String::from(
        "<column-def><column-name>ID</column-name><java-sql-type>4</java-sql-type>\
         <dbms-data-size>10</dbms-data-size><primary-key>true</primary-key></column-def>",
    );
    for target in targets {
        columns.push_str(&format!(
            "<column-def><column-name>{target}_ID</column-name><java-sql-type>4</java-sql-type>\
             <dbms-data-size>10</dbms-data-size></column-def>"
        ));
    }
    format!(
        "<table-def><table-name>{name}</table-name>{columns}<foreign-keys>{fks}</foreign-keys></table-def>"
    )
}

fn document(tables: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<schema-report>{}</schema-report>\n",
        tables.concat()
    )
}

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_schema-normalizer"))
}

#[test]
fn test_missing_metadata_file() {
    let output = bin()
        .args(["normalize", "-p", "/definitely/not/here/metadata.xml"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("metadata file does not exist"));
    assert!(!stderr.contains("panicked"));
}

#[test]
fn test_normalize_prints_status_per_schema() {
    let pkg = package();
    let output = bin()
        .arg("normalize")
        .arg("-p")
        .arg(&pkg.metadata)
        .args(["-c", "true", "-d", "true"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Schema HR: 2 tables ordered, 0 constraints disabled"));

    let ddl = fs::read_to_string(pkg.header.join("HR_ddl.sql")).unwrap();
    assert!(ddl.starts_with("DROP TABLE IF EXISTS org_unit;"));
    assert!(ddl.contains("FOREIGN KEY"));
}

#[test]
fn test_normalize_without_constraints() {
    let pkg = package();
    let output = bin()
        .arg("normalize")
        .arg("-p")
        .arg(&pkg.metadata)
        .args(["-c", "false"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let ddl = fs::read_to_string(pkg.header.join("HR_ddl.sql")).unwrap();
    assert!(!ddl.contains("FOREIGN KEY"));
    assert!(!ddl.contains("DROP TABLE"));
}

#[test]
fn test_normalize_json_report() {
    let pkg = package();
    let output = bin()
        .arg("normalize")
        .arg("-p")
        .arg(&pkg.metadata)
        .args(["--json", "--dialect", "sqlite"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["state"], "done");
    assert_eq!(json["already_normalized"], false);
    assert_eq!(json["schemas"][0]["schema"], "HR");
    assert_eq!(
        json["schemas"][0]["tables"],
        serde_json::json!(["org_unit", "person"])
    );
    assert_eq!(json["renamed"]["tables"], 3);
}

#[test]
fn test_ctl_dialect_rejected_for_ddl() {
    let pkg = package();
    let output = bin()
        .arg("normalize")
        .arg("-p")
        .arg(&pkg.metadata)
        .args(["--dialect", "oracle-ctl"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--ctl"));
}

#[test]
fn test_config_file_extra_terms() {
    let pkg = package();
    let config = pkg.dir.path().join("normalize.yaml");
    fs::write(&config, "extra_illegal_terms: [person]\ncontrol_files: true\n").unwrap();

    let output = bin()
        .arg("normalize")
        .arg("-p")
        .arg(&pkg.metadata)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let tables = fs::read_to_string(pkg.header.join("HR_tables.txt")).unwrap();
    assert_eq!(tables, "org_unit\nperson_\n");
    assert!(pkg.header.join("HR_ctl").join("person_.ctl").exists());
}

#[test]
fn test_order_command_writes_nothing() {
    let pkg = package();
    let output = bin()
        .arg("order")
        .arg("-p")
        .arg(&pkg.metadata)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "# HR\norg_unit\nperson\n");
    assert_eq!(
        fs::read_to_string(&pkg.metadata).unwrap(),
        METADATA
    );
    assert!(pkg.data.join("ORG_UNIT.tsv").exists());
}

#[test]
fn test_reorder_command() {
    let pkg = package();
    let file = pkg.data.join("ORG_UNIT.tsv");
    let output = bin()
        .arg("reorder")
        .arg(&file)
        .args(["--child", "ID", "--parent", "PARENT_ID"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "ID\tPARENT_ID\tNAME\n20\t\tHead office\n10\t20\tSales\n30\t10\tSales north\n"
    );
}

#[test]
fn test_completions() {
    let output = bin()
        .args(["completions", "bash"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("schema-normalizer"));
}

#[test]
fn test_normalize_fails_when_a_table_is_skipped() {
    let xml = document(&[
        table_xml("A", &[]),
        "<table-def><table-name>GEO</table-name><column-def><column-name>SHAPE</column-name>\
         <java-sql-type>1111</java-sql-type><dbms-data-size>0</dbms-data-size></column-def>\
         </table-def>"
            .to_string(),
    ]);
    let pkg = package_with(&xml);
    let output = bin()
        .arg("normalize")
        .arg("-p")
        .arg(&pkg.metadata)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported-type"));
    assert!(stderr.contains("1 error(s) recorded"));

    let ddl = fs::read_to_string(pkg.header.join("PUBLIC_ddl.sql")).unwrap();
    assert!(ddl.contains("CREATE TABLE a ("));
    assert!(!ddl.contains("CREATE TABLE geo"));
}
