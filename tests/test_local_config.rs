
use std::fs::write;
use tempfile::tempdir;



use sendemail::config::{
                lookup_local_value,
                LOCAL_CONFIG_FILE,
               };


#[test]
fn test_lookup_local_value_success() {
  let dir = tempdir().unwrap();
  let conts = r#"
# multi_report settings
FromName="Multi Report"   # shown in the From header
From="reports@example.com"
Email=admin@example.com
"#;

  write(dir.path().join(LOCAL_CONFIG_FILE), conts).unwrap();

  assert_eq!(lookup_local_value(dir.path(), "FromName"), "Multi Report");
  assert_eq!(lookup_local_value(dir.path(), "From"), "reports@example.com");
  assert_eq!(lookup_local_value(dir.path(), "Email"), "admin@example.com");
}

#[test]
fn test_lookup_local_value_no_such_file() {
  let dir = tempdir().unwrap();

  assert_eq!(lookup_local_value(dir.path(), "From"), "");
}

#[test]
fn test_lookup_local_value_commented_out() {
  let dir = tempdir().unwrap();
  let conts = r#"
#From="old@example.com"
  # From="older@example.com"
"#;

  write(dir.path().join(LOCAL_CONFIG_FILE), conts).unwrap();

  assert_eq!(lookup_local_value(dir.path(), "From"), "", "commented lines must be ignored");
}

#[test]
fn test_lookup_local_value_first_match_wins() {
  let dir = tempdir().unwrap();
  let conts = r#"
From=first@example.com
From=second@example.com
"#;

  write(dir.path().join(LOCAL_CONFIG_FILE), conts).unwrap();

  assert_eq!(lookup_local_value(dir.path(), "From"), "first@example.com");
}

#[test]
fn test_lookup_local_value_key_prefix_is_exact() {
  let dir = tempdir().unwrap();
  let conts = r#"
FromName=Reports
"#;

  write(dir.path().join(LOCAL_CONFIG_FILE), conts).unwrap();

  // "FromName=..." must not satisfy a lookup for "From"
  assert_eq!(lookup_local_value(dir.path(), "From"), "");
}
