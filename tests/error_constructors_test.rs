use psegli::error::PsegError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(PsegError::config("x"), PsegError::Config { .. }));
    assert!(matches!(PsegError::auth("x"), PsegError::Auth { .. }));
    assert!(matches!(
        PsegError::navigation_timeout("submit", "x"),
        PsegError::NavigationTimeout { .. }
    ));
    assert!(matches!(
        PsegError::navigation("x"),
        PsegError::Navigation { .. }
    ));
    assert!(matches!(
        PsegError::malformed(3, "x"),
        PsegError::MalformedDataPoint { index: 3, .. }
    ));
}

#[test]
fn error_constructors_group_2() {
    assert!(matches!(
        PsegError::unreachable("x"),
        PsegError::UnreachableGateway { .. }
    ));
    assert!(matches!(
        PsegError::storage_query("x"),
        PsegError::StorageQuery { .. }
    ));
    assert!(matches!(PsegError::storage("x"), PsegError::Storage { .. }));
    assert!(matches!(PsegError::network("x"), PsegError::Network { .. }));
    assert!(matches!(PsegError::api("x"), PsegError::Api { .. }));
    assert!(matches!(PsegError::io("x"), PsegError::Io { .. }));
}

#[test]
fn error_constructors_group_3() {
    assert!(matches!(
        PsegError::validation("f", "m"),
        PsegError::Validation { .. }
    ));
    assert!(matches!(PsegError::web("x"), PsegError::Web { .. }));
    assert!(matches!(PsegError::timeout("x"), PsegError::Timeout { .. }));
    assert!(matches!(PsegError::generic("x"), PsegError::Generic { .. }));
}

#[test]
fn classification_helpers() {
    assert!(PsegError::auth("cookie rejected").is_auth());
    assert!(!PsegError::api("500").is_auth());
    assert!(PsegError::navigation_timeout("goto", "slow").is_navigation_timeout());
    assert!(!PsegError::navigation("gone").is_navigation_timeout());
}

#[test]
fn display_messages() {
    let s = PsegError::validation("field", "bad").to_string();
    assert!(s.contains("Validation error"));
    assert!(s.contains("field"));

    let s = PsegError::navigation_timeout("login button", "not found").to_string();
    assert_eq!(s, "Navigation timeout during login button: not found");
}

#[test]
fn conversions_keep_the_category() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    assert!(matches!(PsegError::from(io), PsegError::Io { .. }));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(PsegError::from(json), PsegError::Serialization { .. }));

    let yaml = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
    assert!(matches!(PsegError::from(yaml), PsegError::Serialization { .. }));
}
