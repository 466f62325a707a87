use pgsql_relation::{
    ConversationStore, DatabaseGrant, Dispatcher, GeneratedCredentials, HookKind, JsonFileStore,
    MemoryStore, PgsqlProvides, ProvisionOutcome, RelationEvent, RequestFlag,
};
use serde_json::{Value, json};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn wordpress_grant() -> DatabaseGrant {
    DatabaseGrant {
        host: "10.0.0.5".to_string(),
        port: 5432,
        database: "wp_db".to_string(),
        user: "wp_user".to_string(),
        password: "secret".to_string(),
        schema_user: "admin_user".to_string(),
        schema_password: "admin_secret".to_string(),
        state: "live".to_string(),
    }
}

fn send<S: ConversationStore>(
    provides: &mut PgsqlProvides<S>,
    unit: &str,
    settings: &[(&str, &str)],
) -> Result<(), pgsql_relation::StoreError> {
    let event = RelationEvent::new(HookKind::Changed, unit);
    provides
        .store_mut()
        .conversation(event.service())?
        .receive_remote(
            settings
                .iter()
                .map(|(key, value)| ((*key).to_string(), Value::from(*value))),
        );
    provides.joined_changed(&event)?;
    Ok(())
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[test]
fn wordpress_negotiation_end_to_end() -> TestResult {
    let mut provides = PgsqlProvides::new(MemoryStore::new());
    send(
        &mut provides,
        "wordpress/0",
        &[("database", ""), ("roles", "admin,readonly")],
    )?;
    assert!(provides.is_requested("wordpress", RequestFlag::Database));
    assert!(provides.is_requested("wordpress", RequestFlag::Roles));

    assert_eq!(
        provides.provide_database("wordpress", &wordpress_grant())?,
        ProvisionOutcome::Applied
    );
    assert!(!provides.is_requested("wordpress", RequestFlag::Database));
    assert_eq!(provides.previous_database("wordpress"), Some("wp_db"));

    let roles = strings(&["admin", "readonly"]);
    assert_eq!(
        provides.ack_roles("wordpress", &roles)?,
        ProvisionOutcome::Applied
    );
    assert!(!provides.is_requested("wordpress", RequestFlag::Roles));
    assert_eq!(provides.previous_roles("wordpress"), Some(roles));

    let conversation = provides
        .store()
        .find("wordpress")
        .ok_or("wordpress conversation missing")?;
    assert_eq!(conversation.get_remote("user"), Some(&json!("wp_user")));
    assert_eq!(conversation.get_remote("password"), Some(&json!("secret")));

    let evaluation =
        provides.joined_changed(&RelationEvent::new(HookKind::Changed, "wordpress/0"))?;
    assert!(evaluation.raised.is_empty());
    assert_eq!(provides.requested_database("wordpress"), "wp_db");
    assert_eq!(
        Some(provides.requested_database("wordpress")),
        provides.previous_database("wordpress")
    );
    assert!(provides.pending(RequestFlag::Database).is_empty());
    assert!(provides.pending(RequestFlag::Roles).is_empty());
    Ok(())
}

#[test]
fn served_default_request_stays_quiet_on_next_event() -> TestResult {
    let mut provides = PgsqlProvides::new(MemoryStore::new());
    let mut dispatcher = Dispatcher::new(GeneratedCredentials::new("10.0.0.5", 5432, "live"));
    provides
        .store_mut()
        .conversation("wordpress")?
        .receive_remote([("database".to_string(), json!(""))]);
    let first = dispatcher.handle(
        &mut provides,
        &RelationEvent::new(HookKind::Joined, "wordpress/0"),
    )?;
    assert_eq!(first.provided, vec!["wordpress".to_string()]);
    let provided = provides
        .previous_database("wordpress")
        .ok_or("database not provided")?
        .to_string();
    assert_eq!(provides.requested_database("wordpress"), provided);

    let second = dispatcher.handle(
        &mut provides,
        &RelationEvent::new(HookKind::Changed, "wordpress/0"),
    )?;
    assert!(second.raised.is_empty());
    assert!(second.provided.is_empty());
    assert!(second.acknowledged.is_empty());
    Ok(())
}

#[test]
fn acknowledged_database_is_not_requested_again() -> TestResult {
    let mut provides = PgsqlProvides::new(MemoryStore::new());
    send(
        &mut provides,
        "wordpress/0",
        &[("database", "wp_db"), ("roles", "admin")],
    )?;
    provides.provide_database("wordpress", &wordpress_grant())?;
    provides.ack_roles("wordpress", &strings(&["admin"]))?;

    send(
        &mut provides,
        "wordpress/1",
        &[("database", "wp_db"), ("roles", "admin")],
    )?;
    assert!(provides.pending(RequestFlag::Database).is_empty());
    assert!(provides.pending(RequestFlag::Roles).is_empty());
    assert_eq!(
        provides.requested_databases().collect::<Vec<_>>(),
        vec![("wordpress", "wp_db")]
    );
    Ok(())
}

#[test]
fn repeated_evaluation_does_not_reraise_cleared_flags() -> TestResult {
    let mut provides = PgsqlProvides::new(MemoryStore::new());
    send(&mut provides, "wordpress/0", &[("database", "wp_db")])?;
    provides.provide_database("wordpress", &wordpress_grant())?;
    provides.ack_roles("wordpress", &[])?;

    for _ in 0..2 {
        let evaluation = provides.evaluate("wordpress")?;
        assert!(evaluation.raised.is_empty());
        assert!(!provides.is_requested("wordpress", RequestFlag::Database));
        assert!(!provides.is_requested("wordpress", RequestFlag::Roles));
    }
    Ok(())
}

#[test]
fn changed_request_raises_flag_again() -> TestResult {
    let mut provides = PgsqlProvides::new(MemoryStore::new());
    send(&mut provides, "wordpress/0", &[("database", "wp_db")])?;
    provides.provide_database("wordpress", &wordpress_grant())?;

    send(&mut provides, "wordpress/0", &[("database", "wp_archive")])?;
    assert!(provides.is_requested("wordpress", RequestFlag::Database));
    assert_eq!(provides.requested_database("wordpress"), "wp_archive");
    assert_eq!(provides.previous_database("wordpress"), Some("wp_db"));
    Ok(())
}

#[test]
fn reverting_request_keeps_flag_until_acknowledged() -> TestResult {
    let mut provides = PgsqlProvides::new(MemoryStore::new());
    send(&mut provides, "wordpress/0", &[("database", "wp_db")])?;
    provides.provide_database("wordpress", &wordpress_grant())?;

    send(&mut provides, "wordpress/0", &[("database", "wp_archive")])?;
    send(&mut provides, "wordpress/0", &[("database", "wp_db")])?;
    assert_eq!(
        provides.requested_database("wordpress"),
        provides.previous_database("wordpress").unwrap_or_default()
    );
    assert!(provides.is_requested("wordpress", RequestFlag::Database));
    Ok(())
}

#[test]
fn roles_parse_drops_empty_tokens_but_ack_keeps_input() -> TestResult {
    let mut provides = PgsqlProvides::new(MemoryStore::new());
    send(&mut provides, "wordpress/0", &[("roles", "a,,b,")])?;
    assert_eq!(provides.requested_roles("wordpress"), strings(&["a", "b"]));

    let acked = strings(&["a", "b"]);
    provides.ack_roles("wordpress", &acked)?;
    assert_eq!(provides.previous_roles("wordpress"), Some(acked));
    Ok(())
}

#[test]
fn services_are_isolated() -> TestResult {
    let mut provides = PgsqlProvides::new(MemoryStore::new());
    send(
        &mut provides,
        "wordpress/0",
        &[("database", "wp_db"), ("roles", "admin")],
    )?;
    send(&mut provides, "mediawiki/0", &[("database", "wiki")])?;

    provides.provide_database("wordpress", &wordpress_grant())?;
    provides.ack_roles("wordpress", &strings(&["admin"]))?;

    assert!(provides.is_requested("mediawiki", RequestFlag::Database));
    assert!(provides.is_requested("mediawiki", RequestFlag::Roles));
    assert!(provides.previous_database("mediawiki").is_none());
    assert!(provides.previous_roles("mediawiki").is_none());
    let mediawiki = provides
        .store()
        .find("mediawiki")
        .ok_or("mediawiki conversation missing")?;
    assert!(mediawiki.get_remote("host").is_none());

    assert_eq!(
        provides.all_requested_roles(),
        vec![
            ("mediawiki".to_string(), Vec::new()),
            ("wordpress".to_string(), strings(&["admin"])),
        ]
    );
    Ok(())
}

#[test]
fn baselines_survive_reload_from_disk() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("relation.json");

    let mut provides = PgsqlProvides::new(JsonFileStore::load(&path)?);
    let mut dispatcher = Dispatcher::new(GeneratedCredentials::new("10.0.0.5", 5432, "live"));
    provides
        .store_mut()
        .conversation("wordpress")?
        .receive_remote([("database".to_string(), json!("wp_db"))]);
    dispatcher.handle(
        &mut provides,
        &RelationEvent::new(HookKind::Joined, "wordpress/0"),
    )?;
    let first_password = provides
        .store()
        .find("wordpress")
        .and_then(|conversation| conversation.get_remote("password").cloned())
        .ok_or("password not published")?;

    let mut reloaded = PgsqlProvides::new(JsonFileStore::load(&path)?);
    assert_eq!(reloaded.previous_database("wordpress"), Some("wp_db"));
    let report = dispatcher.handle(
        &mut reloaded,
        &RelationEvent::new(HookKind::Changed, "wordpress/0"),
    )?;
    assert!(report.raised.is_empty());
    assert!(report.provided.is_empty());
    assert_eq!(
        reloaded
            .store()
            .find("wordpress")
            .and_then(|conversation| conversation.get_remote("password")),
        Some(&first_password)
    );
    Ok(())
}
