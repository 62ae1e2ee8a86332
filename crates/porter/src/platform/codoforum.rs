//! CodoForum source. Tested against CodoForum 3.7 schemas.

use crate::capability::{CapabilityFlags, Feature, FeatureSupport, Flag, Support};
use crate::error::Result;
use crate::mapping::ExportOperation;

use super::model::{self, CATEGORY, COMMENT, DISCUSSION, ROLE, USER, USER_META, USER_ROLE};
use super::{Platform, RequiredTable};

/// CodoForum exporter. Queries alias straight to intermediate column names.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodoForum;

const REQUIRED: &[RequiredTable] = &[
    RequiredTable::new("users", &["id", "username", "mail", "user_status", "pass", "signature"]),
    RequiredTable::new("roles", &["rid", "rname"]),
    RequiredTable::new("user_roles", &["uid", "rid"]),
    RequiredTable::new("categories", &["cat_id", "cat_name"]),
    RequiredTable::new("topics", &["topic_id", "cat_id", "uid", "title"]),
    RequiredTable::new("posts", &["post_id", "topic_id", "uid", "imessage"]),
];

impl Platform for CodoForum {
    fn id(&self) -> &'static str {
        "codoforum"
    }

    fn name(&self) -> &'static str {
        "CodoForum"
    }

    fn prefix(&self) -> &'static str {
        "codo_"
    }

    fn charset_table(&self) -> Option<&'static str> {
        Some("posts")
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
            (Feature::Signatures, Support::Yes),
        ])
    }

    fn required_structure(&self) -> Vec<RequiredTable> {
        REQUIRED.to_vec()
    }

    fn operations(&self) -> Result<Vec<ExportOperation>> {
        Ok(vec![
            ExportOperation::new(
                USER,
                "select
                    u.id as UserID,
                    u.username as Name,
                    u.mail as Email,
                    u.user_status as Verified,
                    u.pass as Password,
                    'Vanilla' as HashMethod,
                    from_unixtime(u.created) as DateFirstVisit
                from :_users u",
                model::structure(USER)?,
            ),
            ExportOperation::new(
                ROLE,
                "select r.rid as RoleID, r.rname as Name from :_roles r",
                model::structure(ROLE)?,
            ),
            ExportOperation::new(
                USER_ROLE,
                "select ur.uid as UserID, ur.rid as RoleID
                from :_user_roles ur
                where ur.is_primary = 1",
                model::structure(USER_ROLE)?,
            ),
            ExportOperation::new(
                USER_META,
                "select
                    u.id as UserID,
                    'Plugin.Signatures.Sig' as Name,
                    u.signature as Value
                from :_users u
                where u.signature != '' and u.signature is not null",
                model::structure(USER_META)?,
            ),
            ExportOperation::new(
                CATEGORY,
                "select c.cat_id as CategoryID, c.cat_name as Name from :_categories c",
                model::structure(CATEGORY)?,
            ),
            ExportOperation::new(
                DISCUSSION,
                "select
                    t.topic_id as DiscussionID,
                    t.cat_id as CategoryID,
                    t.uid as InsertUserID,
                    t.title as Name,
                    from_unixtime(t.topic_created) as DateInserted,
                    from_unixtime(t.last_post_time) as DateLastComment
                from :_topics t",
                model::structure(DISCUSSION)?,
            ),
            ExportOperation::new(
                COMMENT,
                "select
                    p.post_id as CommentID,
                    p.topic_id as DiscussionID,
                    p.uid as InsertUserID,
                    p.imessage as Body,
                    'Markdown' as Format,
                    from_unixtime(p.post_created) as DateInserted
                from :_posts p",
                model::structure(COMMENT)?,
            ),
        ])
    }
}
