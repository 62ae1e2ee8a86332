//! Web Wiz Forums source.

use crate::capability::{CapabilityFlags, Feature, FeatureSupport, Flag, Support};
use crate::core::TypeDescriptor;
use crate::error::Result;
use crate::mapping::{ColumnMap, ColumnSpec, ExportOperation, Filter, Gate};

use super::model::{
    self, CATEGORY, COMMENT, CONVERSATION, CONVERSATION_MESSAGE, DISCUSSION, ROLE, USER,
    USER_CONVERSATION, USER_META, USER_ROLE,
};
use super::{Platform, RequiredTable};

/// Web Wiz Forums exporter.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebWiz;

const REQUIRED: &[RequiredTable] = &[
    RequiredTable::new("Author", &["Author_ID", "Group_ID", "Username", "Password", "Salt", "Signature"]),
    RequiredTable::new("Group", &["Group_ID", "Name"]),
    RequiredTable::new("Forum", &["Forum_ID", "Cat_ID", "Forum_name"]),
    RequiredTable::new("Category", &["Cat_ID", "Cat_name"]),
    RequiredTable::new("Topic", &["Topic_ID", "Forum_ID", "Start_Thread_ID", "Subject"]),
    RequiredTable::new("Thread", &["Thread_ID", "Topic_ID", "Author_ID", "Message"]),
    RequiredTable::new("PMMessage", &["PM_ID", "PM_Tittle", "Author_ID", "From_ID", "PM_Message"]),
];

const USER_MAP: &str = r#"{
    "Author_ID": "UserID",
    "Username": {"Column": "Name", "Filter": "htmlDecode"},
    "Real_name": {"Column": "FullName", "Type": "varchar(50)", "Filter": "htmlDecode"},
    "Password": {"Column": "Password", "Filter": "concat(Salt, '$')"},
    "Gender2": "Gender",
    "Author_email": "Email",
    "Photo2": {"Column": "Photo", "Filter": "htmlDecode"},
    "Login_IP": "LastIPAddress",
    "Banned": {"Column": "Banned", "Filter": "bool", "Default": 0},
    "Join_date": "DateInserted",
    "Last_visit": "DateLastActive",
    "Location": {"Column": "Location", "Filter": "htmlDecode"},
    "DOB": "DateOfBirth",
    "Show_email": {"Column": "ShowEmail", "Filter": "bool"}
}"#;

const DISCUSSION_QUERY: &str = "select
        th.Author_ID,
        th.Message,
        th.Message_date,
        th.IP_addr,
        'Html' as Format,
        t.*
    from :_Topic t
    join :_Thread th on t.Start_Thread_ID = th.Thread_ID";

fn discussion_map() -> ColumnMap {
    ColumnMap::new()
        .rename("Topic_ID", "DiscussionID")
        .rename("Forum_ID", "CategoryID")
        .rename("Author_ID", "InsertUserID")
        .column("Subject", ColumnSpec::to("Name").filter(Filter::HtmlDecode))
        .rename("IP_addr", "InsertIPAddress")
        .rename("Format", "Format")
        .rename("Message_date", "DateInserted")
        .rename("No_of_views", "CountViews")
        .column("Locked", ColumnSpec::to("Closed").filter(Filter::Bool))
}

fn comment_map() -> ColumnMap {
    ColumnMap::new()
        .rename("Thread_ID", "CommentID")
        .rename("Topic_ID", "DiscussionID")
        .rename("Author_ID", "InsertUserID")
        .rename("IP_addr", "InsertIPAddress")
        .rename("Message", "Body")
        .rename("Format", "Format")
        .rename("Message_date", "DateInserted")
}

/// Scratch tables grouping private messages into conversations by
/// normalized title and participant set.
const CONVERSATION_SETUP: &[&str] = &[
    "drop table if exists z_pmto",
    "create table z_pmto (PM_ID int unsigned, User_ID int, primary key (PM_ID, User_ID))",
    "insert ignore z_pmto (PM_ID, User_ID) select PM_ID, Author_ID from :_PMMessage",
    "insert ignore z_pmto (PM_ID, User_ID) select PM_ID, From_ID from :_PMMessage",
    "drop table if exists z_pmto2",
    "create table z_pmto2 (PM_ID int unsigned, UserIDs varchar(250), primary key (PM_ID))",
    "replace z_pmto2 (PM_ID, UserIDs)
        select PM_ID, group_concat(User_ID order by User_ID) from z_pmto group by PM_ID",
    "drop table if exists z_pmtext",
    "create table z_pmtext (
        PM_ID int unsigned, Title varchar(250), Title2 varchar(250),
        UserIDs varchar(250), Group_ID int unsigned)",
    "insert z_pmtext (PM_ID, Title, Title2)
        select PM_ID, PM_Tittle,
            case when PM_Tittle like 'Re:%' then trim(substring(PM_Tittle, 4)) else PM_Tittle end
        from :_PMMessage",
    "create index z_idx_pmtext on z_pmtext (PM_ID)",
    "update z_pmtext pm join z_pmto2 t on pm.PM_ID = t.PM_ID set pm.UserIDs = t.UserIDs",
    "drop table if exists z_pmgroup",
    "create table z_pmgroup (Group_ID int unsigned, Title varchar(250), UserIDs varchar(250))",
    "insert z_pmgroup (Group_ID, Title, UserIDs)
        select min(pm.PM_ID), pm.Title2, t2.UserIDs
        from z_pmtext pm join z_pmto2 t2 on pm.PM_ID = t2.PM_ID
        group by pm.Title2, t2.UserIDs",
    "create index z_idx_pmgroup on z_pmgroup (Title, UserIDs)",
    "create index z_idx_pmgroup2 on z_pmgroup (Group_ID)",
    "update z_pmtext pm join z_pmgroup g on pm.Title2 = g.Title and pm.UserIDs = g.UserIDs
        set pm.Group_ID = g.Group_ID",
];

impl Platform for WebWiz {
    fn id(&self) -> &'static str {
        "webwiz"
    }

    fn name(&self) -> &'static str {
        "Web Wiz Forums"
    }

    fn prefix(&self) -> &'static str {
        "tbl"
    }

    fn charset_table(&self) -> Option<&'static str> {
        Some("Topic")
    }

    fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::new().with(Flag::HasDiscussionBody, true)
    }

    fn features(&self) -> FeatureSupport {
        FeatureSupport::new([
            (Feature::Users, Support::Yes),
            (Feature::Passwords, Support::Yes),
            (Feature::Categories, Support::Yes),
            (Feature::Discussions, Support::Yes),
            (Feature::Comments, Support::Yes),
            (Feature::Roles, Support::Yes),
            (Feature::Avatars, Support::Yes),
            (Feature::PrivateMessages, Support::Yes),
            (Feature::Signatures, Support::Yes),
        ])
    }

    fn required_structure(&self) -> Vec<RequiredTable> {
        REQUIRED.to_vec()
    }

    fn setup_statements(&self) -> Vec<String> {
        CONVERSATION_SETUP.iter().map(|s| s.to_string()).collect()
    }

    fn operations(&self) -> Result<Vec<ExportOperation>> {
        let user = ExportOperation::new(
            USER,
            "select
                case u.Gender when 'Male' then 'm' when 'Female' then 'f' else 'u' end as Gender2,
                case when Avatar like 'http%' then Avatar
                     when Avatar > '' then concat('webwiz/', Avatar)
                     else null end as Photo2,
                'webwiz' as HashMethod,
                u.*
            from :_Author u",
            model::structure(USER)?,
        )
        .with_map(ColumnMap::from_json(USER_MAP)?);

        let role = ExportOperation::new(ROLE, "select * from :_Group", model::structure(ROLE)?)
            .with_map(ColumnMap::new().rename("Group_ID", "RoleID").rename("Name", "Name"));

        let user_role = ExportOperation::new(
            USER_ROLE,
            "select u.* from :_Author u",
            model::structure(USER_ROLE)?,
        )
        .with_map(ColumnMap::new().rename("Author_ID", "UserID").rename("Group_ID", "RoleID"));

        let user_meta = ExportOperation::new(
            USER_META,
            "select
                Author_ID as UserID,
                'Plugin.Signatures.Sig' as Name,
                Signature as Value
            from :_Author
            where Signature <> ''",
            model::structure(USER_META)?,
        );

        let category = ExportOperation::new(
            CATEGORY,
            "select
                f.Forum_ID,
                f.Cat_ID * 1000 as Parent_ID,
                f.Forum_order,
                f.Forum_name,
                f.Forum_description
            from :_Forum f
            union all
            select c.Cat_ID * 1000, null, c.Cat_order, c.Cat_name, null
            from :_Category c",
            model::structure(CATEGORY)?,
        )
        .with_map(
            ColumnMap::new()
                .rename("Forum_ID", "CategoryID")
                .column("Forum_name", ColumnSpec::to("Name").filter(Filter::HtmlDecode))
                .column("Forum_description", ColumnSpec::to("Description").filter(Filter::HtmlDecode))
                .rename("Parent_ID", "ParentCategoryID")
                .rename("Forum_order", "Sort"),
        );

        let discussion = ExportOperation::new(
            DISCUSSION,
            DISCUSSION_QUERY,
            model::structure(DISCUSSION)?,
        )
        .with_map(discussion_map().rename("Message", "Body"))
        .gated(Gate::Unless(Flag::HasDiscussionBody));

        // Without discussion bodies the first post of each topic becomes a comment.
        let bodiless_discussion = ExportOperation::new(
            DISCUSSION,
            DISCUSSION_QUERY,
            model::structure(DISCUSSION)?,
        )
        .with_map(discussion_map())
        .gated(Gate::When(Flag::HasDiscussionBody));

        let first_post = ExportOperation::new(
            COMMENT,
            "select th.*, 'Html' as Format
            from :_Thread th
            join :_Topic t on t.Topic_ID = th.Topic_ID
            where th.Thread_ID = t.Start_Thread_ID",
            model::structure(COMMENT)?,
        )
        .with_map(comment_map())
        .gated(Gate::When(Flag::HasDiscussionBody));

        let comment = ExportOperation::new(
            COMMENT,
            "select th.*, 'Html' as Format
            from :_Thread th
            join :_Topic t on t.Topic_ID = th.Topic_ID
            where th.Thread_ID <> t.Start_Thread_ID",
            model::structure(COMMENT)?,
        )
        .with_map(comment_map());

        let conversation = ExportOperation::new(
            CONVERSATION,
            "select pm.*, g.Title
            from :_PMMessage pm
            join z_pmgroup g on pm.PM_ID = g.Group_ID",
            model::structure(CONVERSATION)?,
        )
        .with_map(
            ColumnMap::new()
                .rename("PM_ID", "ConversationID")
                .column(
                    "Title",
                    ColumnSpec::to("Subject")
                        .typed(TypeDescriptor::Varchar(255))
                        .filter(Filter::HtmlDecode),
                )
                .rename("Author_ID", "InsertUserID")
                .rename("PM_Message_Date", "DateInserted"),
        );

        let user_conversation = ExportOperation::new(
            USER_CONVERSATION,
            "select g.Group_ID, t.User_ID
            from z_pmto t
            join z_pmgroup g on g.Group_ID = t.PM_ID",
            model::structure(USER_CONVERSATION)?,
        )
        .with_map(
            ColumnMap::new()
                .rename("Group_ID", "ConversationID")
                .rename("User_ID", "UserID")
                .column("Deleted", ColumnSpec::to("Deleted").default(0)),
        );

        let message = ExportOperation::new(
            CONVERSATION_MESSAGE,
            "select pm.*, pm2.Group_ID, 'Html' as Format
            from :_PMMessage pm
            join z_pmtext pm2 on pm.PM_ID = pm2.PM_ID",
            model::structure(CONVERSATION_MESSAGE)?,
        )
        .with_map(
            ColumnMap::new()
                .rename("Group_ID", "ConversationID")
                .rename("PM_ID", "MessageID")
                .rename("PM_Message", "Body")
                .rename("Format", "Format")
                .rename("PM_Message_Date", "DateInserted")
                .rename("Author_ID", "InsertUserID"),
        );

        Ok(vec![
            user,
            role,
            user_role,
            user_meta,
            category,
            discussion,
            bodiless_discussion,
            first_post,
            comment,
            conversation,
            user_conversation,
            message,
        ])
    }
}
