//! End-to-end runs through the orchestrator on SQLite databases.

mod common;

use std::sync::Arc;

use porter::platform::model::{self, CATEGORY, COMMENT, DISCUSSION, ROLE, USER, USER_ROLE};
use async_trait::async_trait;
use porter::{
    CapabilityFlags, ColumnMap, ColumnSpec, Database, ExportOperation, FeatureSupport, Filter,
    Flag, Gate, Orchestrator, OutputMode, Platform, PlatformRegistry, PorterError, Postscript,
    RequiredTable, Result, RunPhase, RunRequest, TableStructure, TypeDescriptor,
};

use common::Fixture;

/// Source platform over `t_users` and `t_topics`.
struct TestForum {
    body: bool,
}

impl Platform for TestForum {
    fn id(&self) -> &'static str {
        "testforum"
    }

    fn name(&self) -> &'static str {
        "Test Forum"
    }

    fn prefix(&self) -> &'static str {
        "t_"
    }

    fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::new().with(Flag::HasDiscussionBody, self.body)
    }

    fn features(&self) -> FeatureSupport {
        FeatureSupport::default()
    }

    fn required_structure(&self) -> Vec<RequiredTable> {
        vec![RequiredTable::new("users", &["id", "name", "created_ts"])]
    }

    fn operations(&self) -> Result<Vec<ExportOperation>> {
        let users = TableStructure::new()
            .with("UserID", TypeDescriptor::Integer)
            .with("Name", TypeDescriptor::Varchar(50))
            .with("DateInserted", TypeDescriptor::Varchar(30));
        let discussions = TableStructure::new()
            .with("DiscussionID", TypeDescriptor::Integer)
            .with("Name", TypeDescriptor::Varchar(100));
        let bodies = TableStructure::new()
            .with("DiscussionID", TypeDescriptor::Integer)
            .with("Body", TypeDescriptor::Text);

        Ok(vec![
            ExportOperation::new(USER, "select * from :_users", users).with_map(
                ColumnMap::new()
                    .rename("id", "UserID")
                    .column("name", ColumnSpec::to("Name").filter(Filter::Trim))
                    .column("created_ts", ColumnSpec::to("DateInserted").filter(Filter::Timestamp)),
            ),
            ExportOperation::new(
                DISCUSSION,
                "select id as DiscussionID, title as Name from :_topics",
                discussions,
            ),
            ExportOperation::new(
                "DiscussionBody",
                "select id as DiscussionID, body as Body from :_topics",
                bodies,
            )
            .gated(Gate::Unless(Flag::HasDiscussionBody)),
        ])
    }
}

/// Target platform importing discussions and, unless suppressed, bodies.
struct TestTarget;

impl Platform for TestTarget {
    fn id(&self) -> &'static str {
        "testtarget"
    }

    fn name(&self) -> &'static str {
        "Test Target"
    }

    fn prefix(&self) -> &'static str {
        "TGT_"
    }

    fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::new().with(Flag::HasDiscussionBody, false)
    }

    fn features(&self) -> FeatureSupport {
        FeatureSupport::default()
    }

    fn operations(&self) -> Result<Vec<ExportOperation>> {
        let discussions = TableStructure::new()
            .with("id", TypeDescriptor::Integer)
            .with("title", TypeDescriptor::Varchar(100));
        let bodies = TableStructure::new()
            .with("discussion_id", TypeDescriptor::Integer)
            .with("content", TypeDescriptor::Text);

        Ok(vec![
            ExportOperation::new("discussions", "select * from :_Discussion", discussions)
                .with_map(ColumnMap::new().rename("DiscussionID", "id").rename("Name", "title"))
                .reading([DISCUSSION]),
            ExportOperation::new("bodies", "select * from :_DiscussionBody", bodies)
                .with_map(
                    ColumnMap::new()
                        .rename("DiscussionID", "discussion_id")
                        .rename("Body", "content"),
                )
                .gated(Gate::Unless(Flag::HasDiscussionBody))
                .reading(["DiscussionBody"]),
        ])
    }
}

fn registry(body: bool) -> PlatformRegistry {
    let mut registry = PlatformRegistry::builtin();
    registry.register_source(Arc::new(TestForum { body }));
    registry.register_target(Arc::new(TestTarget));
    registry
}

async fn seed_test_forum(fixture: &Fixture) {
    fixture
        .seed(
            "forum",
            &[
                "CREATE TABLE t_users (id INTEGER, name TEXT, created_ts INTEGER)",
                "INSERT INTO t_users VALUES (1, '  alice ', 0), (2, 'bob', 86400), (3, 'cy  ', NULL)",
                "CREATE TABLE t_topics (id INTEGER, title TEXT, body TEXT)",
                "INSERT INTO t_topics VALUES (10, 'Hello', 'First!'), (11, 'Again', 'Second')",
            ],
        )
        .await;
}

#[tokio::test]
async fn test_three_users_end_to_end() {
    let fixture = Fixture::new("t_");
    seed_test_forum(&fixture).await;

    let orchestrator = Orchestrator::new(fixture.config.clone()).with_registry(registry(false));
    let report = orchestrator
        .run(&RunRequest::new("forum", "local", "testforum"))
        .await
        .unwrap();
    assert_eq!(report.phase, RunPhase::Done, "{:?}", report.comments);
    assert_eq!(report.rows(RunPhase::Exporting, USER), 3);

    let pool = fixture.pool("local").await;
    assert_eq!(
        common::columns(&pool, "PORT_User").await,
        vec!["UserID", "Name", "DateInserted"]
    );
    let rows: Vec<(i64, String, Option<String>)> =
        sqlx::query_as("SELECT UserID, Name, DateInserted FROM PORT_User ORDER BY UserID")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(
        rows,
        vec![
            (1, "alice".to_string(), Some("1970-01-01 00:00:00".to_string())),
            (2, "bob".to_string(), Some("1970-01-02 00:00:00".to_string())),
            (3, "cy".to_string(), None),
        ]
    );

    assert!(report.comments.iter().any(|c| c.starts_with("User: 3 rows in ")));
    assert!(report.comments.iter().any(|c| c.starts_with("ELAPSED — ")));
}

#[tokio::test]
async fn test_body_suppressed_when_both_sides_lack_it() {
    let fixture = Fixture::new("t_");
    seed_test_forum(&fixture).await;

    let orchestrator = Orchestrator::new(fixture.config.clone()).with_registry(registry(false));
    let request = RunRequest::new("forum", "local", "testforum").with_target_platform("testtarget");
    let report = orchestrator.run(&request).await.unwrap();
    assert_eq!(report.phase, RunPhase::Done, "{:?}", report.comments);

    assert!(report
        .comments
        .iter()
        .any(|c| c.contains("Suppressed hasDiscussionBody")));
    assert!(!report.entities.iter().any(|e| e.entity == "DiscussionBody" || e.entity == "bodies"));
    assert_eq!(report.rows(RunPhase::Importing, "discussions"), 2);

    let pool = fixture.pool("local").await;
    let tables = common::tables(&pool).await;
    assert!(!tables.contains(&"PORT_DiscussionBody".to_string()));
    assert!(!tables.contains(&"TGT_bodies".to_string()));
    assert!(tables.contains(&"TGT_discussions".to_string()));
}

#[tokio::test]
async fn test_body_kept_when_source_has_it() {
    let fixture = Fixture::new("t_");
    seed_test_forum(&fixture).await;

    let orchestrator = Orchestrator::new(fixture.config.clone()).with_registry(registry(true));
    let request = RunRequest::new("forum", "local", "testforum").with_target_platform("testtarget");
    let report = orchestrator.run(&request).await.unwrap();
    assert_eq!(report.phase, RunPhase::Done, "{:?}", report.comments);

    assert_eq!(report.rows(RunPhase::Exporting, "DiscussionBody"), 2);
    assert_eq!(report.rows(RunPhase::Importing, "bodies"), 2);

    let pool = fixture.pool("local").await;
    let contents: Vec<String> =
        sqlx::query_scalar("SELECT content FROM TGT_bodies ORDER BY discussion_id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(contents, vec!["First!", "Second"]);
}

#[tokio::test]
async fn test_missing_signature_fails_verification_before_writes() {
    let fixture = Fixture::new("codo_");
    fixture
        .seed(
            "forum",
            &["CREATE TABLE codo_users (id INTEGER, username TEXT, mail TEXT, user_status INTEGER, pass TEXT)"],
        )
        .await;

    let orchestrator = Orchestrator::new(fixture.config.clone());
    let request = RunRequest::new("forum", "local", "codoforum").with_target_platform("flarum");
    let report = orchestrator.run(&request).await.unwrap();

    assert_eq!(report.phase, RunPhase::Failed);
    assert!(report.entities.is_empty());
    assert!(report
        .comments
        .iter()
        .any(|c| c.starts_with("Failed while verifying codoforum (verify)")));
    match report.failure {
        Some(PorterError::MissingSourceStructure { ref table, ref column }) => {
            assert_eq!(table, "codo_users");
            assert_eq!(column.as_deref(), Some("signature"));
        }
        ref other => panic!("unexpected failure: {:?}", other),
    }

    let pool = fixture.pool("local").await;
    assert!(common::tables(&pool).await.is_empty());
}

#[tokio::test]
async fn test_file_output_writes_export_file() {
    let fixture = Fixture::new("t_");
    seed_test_forum(&fixture).await;

    let orchestrator = Orchestrator::new(fixture.config.clone()).with_registry(registry(true));
    let request = RunRequest::new("forum", "export", "testforum")
        .with_target_platform("testtarget")
        .with_output_mode(OutputMode::File);
    let report = orchestrator.run(&request).await.unwrap();
    assert_eq!(report.phase, RunPhase::Done, "{:?}", report.comments);
    assert!(report.comments.iter().any(|c| c.contains("import into Test Target skipped")));
    assert_eq!(report.rows(RunPhase::Importing, "discussions"), 0);

    let content = std::fs::read_to_string(fixture.export_path()).unwrap();
    assert!(content.starts_with("Porter export file\n// charset: utf8mb4\n"));
    assert!(content.contains("\nTable: User\nUserID:integer,Name:varchar(50),DateInserted:varchar(30)\n"));
    assert!(content.contains("1,\"alice\",\"1970-01-01 00:00:00\"\n"));
    assert!(content.contains("3,\"cy\",\\N\n"));
    assert!(content.contains("\nTable: DiscussionBody\n"));
}

#[tokio::test]
async fn test_capture_queries_records_substituted_sql() {
    let fixture = Fixture::with_options("t_", "options:\n  capture_queries: true\n");
    seed_test_forum(&fixture).await;

    let orchestrator = Orchestrator::new(fixture.config.clone()).with_registry(registry(false));
    let report = orchestrator
        .run(&RunRequest::new("forum", "local", "testforum"))
        .await
        .unwrap();

    assert!(report
        .comments
        .iter()
        .any(|c| c == "User query: select * from t_users"));
}

/// Source whose tables already use the intermediate column names.
struct MiniForum;

impl Platform for MiniForum {
    fn id(&self) -> &'static str {
        "miniforum"
    }

    fn name(&self) -> &'static str {
        "Mini Forum"
    }

    fn prefix(&self) -> &'static str {
        "m_"
    }

    fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::new().with(Flag::HasDiscussionBody, true)
    }

    fn features(&self) -> FeatureSupport {
        FeatureSupport::default()
    }

    fn operations(&self) -> Result<Vec<ExportOperation>> {
        [USER, ROLE, USER_ROLE, CATEGORY, DISCUSSION, COMMENT]
            .into_iter()
            .map(|entity| {
                Ok(ExportOperation::new(
                    entity,
                    format!("select * from :_{}", entity),
                    model::structure(entity)?,
                ))
            })
            .collect()
    }
}

#[tokio::test]
async fn test_flarum_import_and_postscript() {
    let fixture = Fixture::new("m_");
    fixture
        .seed(
            "forum",
            &[
                "CREATE TABLE m_User (UserID INTEGER, Name TEXT, Email TEXT, Password TEXT, Verified INTEGER, DateInserted TEXT)",
                "INSERT INTO m_User VALUES
                    (1, 'alice', 'a@example.com', 'x', 1, '2020-01-01 00:00:00'),
                    (2, 'bob', 'b@example.com', 'y', 0, '2020-01-02 00:00:00')",
                "CREATE TABLE m_Role (RoleID INTEGER, Name TEXT)",
                "INSERT INTO m_Role VALUES (4, 'Member')",
                "CREATE TABLE m_UserRole (UserID INTEGER, RoleID INTEGER)",
                "INSERT INTO m_UserRole VALUES (1, 4), (2, 4)",
                "CREATE TABLE m_Category (CategoryID INTEGER, Name TEXT, UrlCode TEXT, Sort INTEGER)",
                "INSERT INTO m_Category VALUES (1, 'General &amp; More', NULL, 1)",
                "CREATE TABLE m_Discussion (DiscussionID INTEGER, CategoryID INTEGER, InsertUserID INTEGER, Name TEXT, Body TEXT, DateInserted TEXT)",
                "INSERT INTO m_Discussion VALUES
                    (1, 1, 1, 'Welcome', 'Hello all', '2020-02-01 00:00:00'),
                    (2, 1, 1, 'Rules', 'Be nice', '2020-02-02 00:00:00')",
                "CREATE TABLE m_Comment (CommentID INTEGER, DiscussionID INTEGER, InsertUserID INTEGER, Body TEXT, DateInserted TEXT)",
                "INSERT INTO m_Comment VALUES
                    (1, 1, 2, 'Hi', '2020-02-01 01:00:00'),
                    (2, 1, 2, 'Again', '2020-02-01 02:00:00'),
                    (3, 2, 1, 'Noted', '2020-02-02 01:00:00')",
            ],
        )
        .await;

    let mut registry = PlatformRegistry::builtin();
    registry.register_source(Arc::new(MiniForum));
    let orchestrator = Orchestrator::new(fixture.config.clone()).with_registry(registry);
    let request = RunRequest::new("forum", "local", "miniforum").with_target_platform("flarum");
    let report = orchestrator.run(&request).await.unwrap();
    assert_eq!(report.phase, RunPhase::Done, "{:?}", report.comments);

    assert!(report
        .comments
        .iter()
        .any(|c| c.starts_with("Skipped recipients import: intermediate UserConversation")));
    assert!(report
        .comments
        .iter()
        .any(|c| c == "merged private recipients: skipped, no FLA_recipients table"));

    let pool = fixture.pool("local").await;
    assert_eq!(common::count(&pool, "FLA_users").await, 2);
    assert_eq!(common::count(&pool, "FLA_group_user").await, 2);
    assert_eq!(common::count(&pool, "FLA_discussion_tag").await, 2);
    // Three comments plus one post per discussion body.
    assert_eq!(common::count(&pool, "FLA_posts").await, 5);

    let tag: (String, String, i64) =
        sqlx::query_as("SELECT name, slug, discussion_count FROM FLA_tags")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(tag, ("General & More".to_string(), "1".to_string(), 2));

    let discussions: Vec<(i64, i64, i64, i64, i64)> = sqlx::query_as(
        "SELECT id, first_post_id, last_post_id, comment_count, participant_count
        FROM FLA_discussions ORDER BY id",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(discussions, vec![(1, 4, 2, 3, 2), (2, 5, 3, 2, 1)]);

    let users: Vec<(i64, i64, i64)> =
        sqlx::query_as("SELECT id, discussion_count, comment_count FROM FLA_users ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(users, vec![(1, 2, 3), (2, 0, 2)]);
}

/// Source that writes `Discussion` twice with different columns, then users.
/// The second write appends to the table the first one created.
struct DriftingForum;

impl Platform for DriftingForum {
    fn id(&self) -> &'static str {
        "driftingforum"
    }

    fn name(&self) -> &'static str {
        "Drifting Forum"
    }

    fn prefix(&self) -> &'static str {
        "t_"
    }

    fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::new()
    }

    fn features(&self) -> FeatureSupport {
        FeatureSupport::default()
    }

    fn operations(&self) -> Result<Vec<ExportOperation>> {
        Ok(vec![
            ExportOperation::new(
                DISCUSSION,
                "select id as DiscussionID, title as Name from :_topics",
                TableStructure::new()
                    .with("DiscussionID", TypeDescriptor::Integer)
                    .with("Name", TypeDescriptor::Varchar(100)),
            ),
            ExportOperation::new(
                DISCUSSION,
                "select id as DiscussionID, body as Body from :_topics",
                TableStructure::new()
                    .with("DiscussionID", TypeDescriptor::Integer)
                    .with("Body", TypeDescriptor::Text),
            ),
            ExportOperation::new(
                USER,
                "select id as UserID, name as Name from :_users",
                TableStructure::new()
                    .with("UserID", TypeDescriptor::Integer)
                    .with("Name", TypeDescriptor::Varchar(50)),
            ),
        ])
    }
}

#[tokio::test]
async fn test_write_failure_aborts_run() {
    let fixture = Fixture::new("t_");
    seed_test_forum(&fixture).await;

    let mut registry = registry(false);
    registry.register_source(Arc::new(DriftingForum));
    let orchestrator = Orchestrator::new(fixture.config.clone()).with_registry(registry);
    let request =
        RunRequest::new("forum", "local", "driftingforum").with_target_platform("testtarget");
    let report = orchestrator.run(&request).await.unwrap();

    assert_eq!(report.phase, RunPhase::Failed, "{:?}", report.comments);
    assert!(matches!(
        report.failure,
        Some(PorterError::DestinationWriteFailure { ref table, .. }) if table == "PORT_Discussion"
    ));
    assert!(report
        .comments
        .iter()
        .any(|c| c.starts_with("Failed while exporting Discussion (export): Write failed")));
    assert_eq!(report.rows(RunPhase::Exporting, DISCUSSION), 2);
    assert!(!report.entities.iter().any(|e| e.entity == USER));
    assert!(!report.comments.iter().any(|c| c.starts_with("Import phase")));

    let pool = fixture.pool("local").await;
    let tables = common::tables(&pool).await;
    assert!(tables.contains(&"PORT_Discussion".to_string()));
    assert!(!tables.contains(&"PORT_User".to_string()));
    assert!(!tables.iter().any(|t| t.starts_with("TGT_")));
    assert_eq!(common::count(&pool, "PORT_Discussion").await, 2);
}

struct FailingPostscript;

#[async_trait]
impl Postscript for FailingPostscript {
    async fn run(&self, _database: &Database, _prefix: &str) -> Result<Vec<String>> {
        Err(PorterError::FinalizationFailure {
            platform: "testtarget".into(),
            message: "boom".into(),
        })
    }
}

#[tokio::test]
async fn test_finalization_failure_keeps_imported_data() {
    let fixture = Fixture::new("t_");
    seed_test_forum(&fixture).await;

    let mut registry = registry(false);
    registry.register_postscript("testtarget", Arc::new(FailingPostscript));
    let orchestrator = Orchestrator::new(fixture.config.clone()).with_registry(registry);
    let request = RunRequest::new("forum", "local", "testforum").with_target_platform("testtarget");
    let report = orchestrator.run(&request).await.unwrap();

    assert_eq!(report.phase, RunPhase::Done, "{:?}", report.comments);
    assert!(report.failure.is_none());
    assert!(report
        .comments
        .iter()
        .any(|c| c == "Finalization failed for testtarget: boom"));
    assert!(!report
        .comments
        .iter()
        .any(|c| c.starts_with("Finalization failed: Finalization failed")));

    let pool = fixture.pool("local").await;
    assert_eq!(common::count(&pool, "TGT_discussions").await, 2);
}
