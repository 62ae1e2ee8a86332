//! The intermediate model: canonical entity structures shared by every source
//! and read by every target.
//!
//! Declarations use MySQL-style type strings and are parsed once per call.

use crate::core::TableStructure;
use crate::error::Result;

pub const USER: &str = "User";
pub const ROLE: &str = "Role";
pub const USER_ROLE: &str = "UserRole";
pub const USER_META: &str = "UserMeta";
pub const CATEGORY: &str = "Category";
pub const DISCUSSION: &str = "Discussion";
pub const COMMENT: &str = "Comment";
pub const CONVERSATION: &str = "Conversation";
pub const USER_CONVERSATION: &str = "UserConversation";
pub const CONVERSATION_MESSAGE: &str = "ConversationMessage";

/// Canonical structure of an intermediate entity.
pub fn structure(entity: &str) -> Result<TableStructure> {
    let columns: &[(&str, &str)] = match entity {
        USER => &[
            ("UserID", "int"),
            ("Name", "varchar(50)"),
            ("Email", "varchar(200)"),
            ("Password", "varbinary(100)"),
            ("HashMethod", "varchar(10)"),
            ("Photo", "varchar(255)"),
            ("Title", "varchar(100)"),
            ("Location", "varchar(100)"),
            ("About", "text"),
            ("Gender", "enum('u','m','f')"),
            ("DateOfBirth", "datetime"),
            ("DateFirstVisit", "datetime"),
            ("DateLastActive", "datetime"),
            ("DateInserted", "datetime"),
            ("LastIPAddress", "varchar(39)"),
            ("ShowEmail", "tinyint(1)"),
            ("Verified", "tinyint(1)"),
            ("Banned", "tinyint(4)"),
            ("Admin", "tinyint(1)"),
        ],
        ROLE => &[
            ("RoleID", "int"),
            ("Name", "varchar(100)"),
            ("Description", "varchar(200)"),
        ],
        USER_ROLE => &[("UserID", "int"), ("RoleID", "int")],
        USER_META => &[
            ("UserID", "int"),
            ("Name", "varchar(255)"),
            ("Value", "text"),
        ],
        CATEGORY => &[
            ("CategoryID", "int"),
            ("Name", "varchar(255)"),
            ("UrlCode", "varchar(255)"),
            ("Description", "varchar(500)"),
            ("ParentCategoryID", "int"),
            ("DateInserted", "datetime"),
            ("InsertUserID", "int"),
            ("Sort", "int"),
            ("Archived", "tinyint(1)"),
        ],
        DISCUSSION => &[
            ("DiscussionID", "int"),
            ("CategoryID", "int"),
            ("InsertUserID", "int"),
            ("UpdateUserID", "int"),
            ("Name", "varchar(100)"),
            ("Body", "text"),
            ("Format", "varchar(20)"),
            ("CountComments", "int"),
            ("CountViews", "int"),
            ("Closed", "tinyint(1)"),
            ("Announce", "tinyint(1)"),
            ("DateInserted", "datetime"),
            ("DateUpdated", "datetime"),
            ("DateLastComment", "datetime"),
            ("InsertIPAddress", "varchar(39)"),
        ],
        COMMENT => &[
            ("CommentID", "int"),
            ("DiscussionID", "int"),
            ("InsertUserID", "int"),
            ("Body", "text"),
            ("Format", "varchar(20)"),
            ("DateInserted", "datetime"),
            ("InsertIPAddress", "varchar(39)"),
        ],
        CONVERSATION => &[
            ("ConversationID", "int"),
            ("Subject", "varchar(255)"),
            ("InsertUserID", "int"),
            ("DateInserted", "datetime"),
        ],
        USER_CONVERSATION => &[
            ("ConversationID", "int"),
            ("UserID", "int"),
            ("Deleted", "tinyint(1)"),
        ],
        CONVERSATION_MESSAGE => &[
            ("MessageID", "int"),
            ("ConversationID", "int"),
            ("Body", "text"),
            ("Format", "varchar(20)"),
            ("InsertUserID", "int"),
            ("DateInserted", "datetime"),
            ("InsertIPAddress", "varchar(39)"),
        ],
        _ => &[],
    };
    TableStructure::parse(columns.iter().copied())
}
