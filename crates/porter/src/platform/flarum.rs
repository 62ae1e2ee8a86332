//! Flarum target: imports the intermediate model into Flarum's tables.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::capability::{CapabilityFlags, Feature, FeatureSupport, Flag, Support};
use crate::connection::Database;
use crate::core::TableStructure;
use crate::drivers::substitute_prefix;
use crate::error::{PorterError, Result};
use crate::mapping::{ColumnMap, ColumnSpec, ExportOperation, Filter, Gate};

use super::model::{
    CATEGORY, COMMENT, CONVERSATION, CONVERSATION_MESSAGE, DISCUSSION, ROLE, USER,
    USER_CONVERSATION, USER_ROLE,
};
use super::{Platform, Postscript};

/// Flarum importer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flarum;

fn table(entity: &str) -> Result<TableStructure> {
    let columns: &[(&str, &str)] = match entity {
        "users" => &[
            ("id", "int"),
            ("username", "varchar(100)"),
            ("email", "varchar(150)"),
            ("is_email_confirmed", "tinyint(1)"),
            ("password", "varchar(100)"),
            ("avatar_url", "varchar(100)"),
            ("joined_at", "datetime"),
            ("last_seen_at", "datetime"),
            ("discussion_count", "int"),
            ("comment_count", "int"),
        ],
        "groups" => &[
            ("id", "int"),
            ("name_singular", "varchar(100)"),
            ("name_plural", "varchar(100)"),
            ("color", "varchar(20)"),
            ("icon", "varchar(100)"),
            ("is_hidden", "tinyint(1)"),
        ],
        "group_user" => &[("user_id", "int"), ("group_id", "int")],
        "tags" => &[
            ("id", "int"),
            ("name", "varchar(100)"),
            ("slug", "varchar(100)"),
            ("description", "text"),
            ("parent_id", "int"),
            ("position", "int"),
            ("discussion_count", "int"),
            ("last_posted_at", "datetime"),
        ],
        "discussions" => &[
            ("id", "int"),
            ("title", "varchar(200)"),
            ("comment_count", "int"),
            ("participant_count", "int"),
            ("created_at", "datetime"),
            ("user_id", "int"),
            ("first_post_id", "int"),
            ("last_posted_at", "datetime"),
            ("last_post_id", "int"),
            ("is_private", "tinyint(1)"),
            ("is_locked", "tinyint(1)"),
            ("is_sticky", "tinyint(1)"),
        ],
        "discussion_tag" => &[("discussion_id", "int"), ("tag_id", "int")],
        "posts" => &[
            ("id", "int"),
            ("discussion_id", "int"),
            ("created_at", "datetime"),
            ("user_id", "int"),
            ("type", "varchar(100)"),
            ("content", "longtext"),
            ("ip_address", "varchar(45)"),
        ],
        "recipients" => &[("discussion_id", "int"), ("user_id", "int")],
        _ => &[],
    };
    TableStructure::parse(columns.iter().copied())
}

fn post_map(id: &str, discussion: &str) -> ColumnMap {
    ColumnMap::new()
        .rename(id, "id")
        .rename(discussion, "discussion_id")
        .rename("InsertUserID", "user_id")
        .rename("DateInserted", "created_at")
        .rename("Body", "content")
        .rename("InsertIPAddress", "ip_address")
}

impl Platform for Flarum {
    fn id(&self) -> &'static str {
        "flarum"
    }

    fn name(&self) -> &'static str {
        "Flarum"
    }

    fn prefix(&self) -> &'static str {
        "FLA_"
    }

    fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::new().with(Flag::HasDiscussionBody, false)
    }

    fn features(&self) -> FeatureSupport {
        FeatureSupport::new([
            (Feature::Users, Support::Yes),
            (Feature::Passwords, Support::Yes),
            (Feature::Categories, Support::Yes),
            (Feature::Discussions, Support::Yes),
            (Feature::Comments, Support::Yes),
            (Feature::Roles, Support::Yes),
            (Feature::Avatars, Support::Partial),
            (Feature::PrivateMessages, Support::Yes),
            (Feature::Tags, Support::Yes),
        ])
    }

    fn operations(&self) -> Result<Vec<ExportOperation>> {
        let users = ExportOperation::new("users", "select u.* from :_User u", table("users")?)
            .with_map(
                ColumnMap::new()
                    .rename("UserID", "id")
                    .rename("Name", "username")
                    .rename("Email", "email")
                    .column("Verified", ColumnSpec::to("is_email_confirmed").filter(Filter::Bool).default(0))
                    .rename("Password", "password")
                    .rename("Photo", "avatar_url")
                    .rename("DateInserted", "joined_at")
                    .rename("DateLastActive", "last_seen_at"),
            )
            .reading([USER]);

        let groups = ExportOperation::new(
            "groups",
            "select r.RoleID, r.Name, r.Name as NamePlural from :_Role r",
            table("groups")?,
        )
        .with_map(
            ColumnMap::new()
                .rename("RoleID", "id")
                .column("Name", ColumnSpec::to("name_singular").filter(Filter::HtmlDecode))
                .column("NamePlural", ColumnSpec::to("name_plural").filter(Filter::HtmlDecode))
                .column("is_hidden", ColumnSpec::to("is_hidden").default(0)),
        )
        .reading([ROLE]);

        let group_user = ExportOperation::new(
            "group_user",
            "select ur.UserID, ur.RoleID from :_UserRole ur",
            table("group_user")?,
        )
        .with_map(ColumnMap::new().rename("UserID", "user_id").rename("RoleID", "group_id"))
        .reading([USER_ROLE]);

        let tags = ExportOperation::new(
            "tags",
            "select c.*, coalesce(c.UrlCode, cast(c.CategoryID as char)) as Slug
            from :_Category c",
            table("tags")?,
        )
        .with_map(
            ColumnMap::new()
                .rename("CategoryID", "id")
                .column("Name", ColumnSpec::to("name").filter(Filter::HtmlDecode))
                .rename("Slug", "slug")
                .rename("Description", "description")
                .rename("ParentCategoryID", "parent_id")
                .rename("Sort", "position"),
        )
        .reading([CATEGORY]);

        let discussions = ExportOperation::new(
            "discussions",
            "select d.*, 0 as is_private from :_Discussion d",
            table("discussions")?,
        )
        .with_map(
            ColumnMap::new()
                .rename("DiscussionID", "id")
                .column("Name", ColumnSpec::to("title").filter(Filter::HtmlDecode))
                .rename("InsertUserID", "user_id")
                .rename("DateInserted", "created_at")
                .rename("CountComments", "comment_count")
                .column("Closed", ColumnSpec::to("is_locked").filter(Filter::Bool).default(0))
                .column("Announce", ColumnSpec::to("is_sticky").filter(Filter::Bool).default(0)),
        )
        .reading([DISCUSSION]);

        let discussion_tag = ExportOperation::new(
            "discussion_tag",
            "select d.DiscussionID, d.CategoryID
            from :_Discussion d
            where d.CategoryID is not null",
            table("discussion_tag")?,
        )
        .with_map(
            ColumnMap::new()
                .rename("DiscussionID", "discussion_id")
                .rename("CategoryID", "tag_id"),
        )
        .reading([DISCUSSION]);

        let comment_posts = ExportOperation::new(
            "posts",
            "select c.*, 'comment' as type from :_Comment c",
            table("posts")?,
        )
        .with_map(post_map("CommentID", "DiscussionID"))
        .reading([COMMENT]);

        // Discussion bodies become the first post, numbered after every comment.
        let body_posts = ExportOperation::new(
            "posts",
            "select d.*,
                (select coalesce(max(c.CommentID), 0) from :_Comment c) + d.DiscussionID as PostID,
                'comment' as type
            from :_Discussion d
            where d.Body is not null",
            table("posts")?,
        )
        .with_map(post_map("PostID", "DiscussionID"))
        .gated(Gate::Unless(Flag::HasDiscussionBody))
        .reading([DISCUSSION, COMMENT]);

        let private_discussions = ExportOperation::new(
            "discussions",
            "select cv.*,
                (select coalesce(max(d.DiscussionID), 0) from :_Discussion d) + cv.ConversationID as PrivateID,
                1 as is_private
            from :_Conversation cv",
            table("discussions")?,
        )
        .with_map(
            ColumnMap::new()
                .rename("PrivateID", "id")
                .column("Subject", ColumnSpec::to("title").filter(Filter::HtmlDecode))
                .rename("InsertUserID", "user_id")
                .rename("DateInserted", "created_at"),
        )
        .reading([CONVERSATION, DISCUSSION]);

        let message_posts = ExportOperation::new(
            "posts",
            "select m.*,
                (select coalesce(max(c.CommentID), 0) from :_Comment c)
                    + (select coalesce(max(d.DiscussionID), 0) from :_Discussion d)
                    + m.MessageID as PostID,
                (select coalesce(max(d.DiscussionID), 0) from :_Discussion d)
                    + m.ConversationID as PrivateID,
                'comment' as type
            from :_ConversationMessage m",
            table("posts")?,
        )
        .with_map(post_map("PostID", "PrivateID"))
        .reading([CONVERSATION_MESSAGE, COMMENT, DISCUSSION]);

        let recipients = ExportOperation::new(
            "recipients",
            "select uc.UserID,
                (select coalesce(max(d.DiscussionID), 0) from :_Discussion d)
                    + uc.ConversationID as PrivateID
            from :_UserConversation uc",
            table("recipients")?,
        )
        .with_map(
            ColumnMap::new()
                .rename("PrivateID", "discussion_id")
                .rename("UserID", "user_id"),
        )
        .reading([USER_CONVERSATION, DISCUSSION]);

        Ok(vec![
            users,
            groups,
            group_user,
            tags,
            discussions,
            discussion_tag,
            comment_posts,
            body_posts,
            private_discussions,
            message_posts,
            recipients,
        ])
    }
}

/// Repairs Flarum's denormalized counters and private threads after import.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlarumPostscript;

/// Finalization steps: label, tables the step touches, statement.
const FINALIZE: &[(&str, &[&str], &str)] = &[
    (
        "merged private posts",
        &["posts", "discussions"],
        "update :_posts set discussion_id = (
            select min(d2.id) from :_discussions d1
            join :_discussions d2
                on d2.title = d1.title and d2.user_id = d1.user_id and d2.is_private = 1
            where d1.id = :_posts.discussion_id)
        where discussion_id in (select id from :_discussions where is_private = 1)",
    ),
    (
        "merged private recipients",
        &["recipients", "discussions"],
        "update :_recipients set discussion_id = (
            select min(d2.id) from :_discussions d1
            join :_discussions d2
                on d2.title = d1.title and d2.user_id = d1.user_id and d2.is_private = 1
            where d1.id = :_recipients.discussion_id)
        where discussion_id in (select id from :_discussions where is_private = 1)",
    ),
    (
        "removed empty private discussions",
        &["discussions", "posts"],
        "delete from :_discussions
        where is_private = 1
            and id not in (select discussion_id from :_posts where discussion_id is not null)",
    ),
    (
        "discussion counters",
        &["discussions", "posts"],
        "update :_discussions set
            first_post_id = (
                select p.id from :_posts p where p.discussion_id = :_discussions.id
                order by p.created_at, p.id limit 1),
            last_post_id = (
                select p.id from :_posts p where p.discussion_id = :_discussions.id
                order by p.created_at desc, p.id desc limit 1),
            comment_count = (select count(*) from :_posts p where p.discussion_id = :_discussions.id),
            participant_count = (
                select count(distinct p.user_id) from :_posts p
                where p.discussion_id = :_discussions.id),
            last_posted_at = (
                select max(p.created_at) from :_posts p
                where p.discussion_id = :_discussions.id)",
    ),
    (
        "tag counters",
        &["tags", "discussion_tag"],
        "update :_tags set discussion_count = (
            select count(*) from :_discussion_tag dt where dt.tag_id = :_tags.id)",
    ),
    (
        "user counters",
        &["users", "discussions", "posts"],
        "update :_users set
            discussion_count = (
                select count(*) from :_discussions d
                where d.user_id = :_users.id and d.is_private = 0),
            comment_count = (select count(*) from :_posts p where p.user_id = :_users.id)",
    ),
];

#[async_trait]
impl Postscript for FlarumPostscript {
    async fn run(&self, database: &Database, prefix: &str) -> Result<Vec<String>> {
        let writer = database.writer();
        let mut notes = Vec::with_capacity(FINALIZE.len());

        for (label, tables, sql) in FINALIZE {
            let mut missing = None;
            for table in tables.iter() {
                let name = format!("{}{}", prefix, table);
                if writer.table_columns(&name).await?.is_none() {
                    missing = Some(name);
                    break;
                }
            }
            if let Some(name) = missing {
                notes.push(format!("{}: skipped, no {} table", label, name));
                continue;
            }

            let sql = substitute_prefix(sql, prefix);
            debug!("Flarum postscript: {}", label);
            let affected = writer.execute(&sql).await.map_err(|e| {
                PorterError::FinalizationFailure {
                    platform: Flarum.id().to_string(),
                    message: format!("{}: {}", label, e),
                }
            })?;
            notes.push(format!("{}: {} rows", label, affected));
        }

        info!("Flarum postscript finished on '{}'", database.alias());
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::RowPlan;

    #[test]
    fn test_import_operations_declare_reads() {
        for op in Flarum.operations().unwrap() {
            assert!(!op.reads.is_empty(), "{} declares no reads", op.entity);
            assert!(op.query.contains(":_"));
            RowPlan::resolve(&op).unwrap();
        }
    }

    #[test]
    fn test_finalize_statements_use_target_prefix() {
        for (_, tables, sql) in FINALIZE {
            assert!(!tables.is_empty());
            let rendered = substitute_prefix(sql, "FLA_");
            assert!(!rendered.contains(":_"));
            assert!(rendered.contains("FLA_"));
        }
    }
}
