//! Row → wire model conversion. Corrupt stored values are logged and replaced
//! with defaults instead of failing the whole response.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use linkus_db::models::{
    ContactDetailRow, ContactRow, ConversationSummaryRow, LastMessageRow, MessageRow, ProfileRow,
};
use linkus_types::models::{
    Contact, ContactDetail, ConversationSummary, LastMessage, Message, MessageType, Profile,
};

pub fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's CURRENT_TIMESTAMP form, no timezone
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

fn parse_message_type(raw: &str) -> MessageType {
    MessageType::parse(raw).unwrap_or_else(|| {
        warn!("Unknown message_type '{}', treating as text", raw);
        MessageType::Text
    })
}

pub fn profile(row: ProfileRow) -> Profile {
    Profile {
        id: parse_id(&row.id, "user"),
        username: row.username,
        full_name: row.full_name,
        avatar_url: row.avatar_url,
    }
}

pub fn message(row: MessageRow) -> Message {
    Message {
        id: parse_id(&row.id, "message"),
        conversation_id: parse_id(&row.conversation_id, "conversation"),
        sender: profile(row.sender),
        content: row.content,
        message_type: parse_message_type(&row.message_type),
        file_url: row.file_url,
        file_name: row.file_name,
        file_size: row.file_size,
        created_at: parse_timestamp(&row.created_at),
    }
}

fn last_message(row: LastMessageRow) -> LastMessage {
    LastMessage {
        id: parse_id(&row.id, "message"),
        content: row.content,
        message_type: parse_message_type(&row.message_type),
        sender_id: parse_id(&row.sender_id, "user"),
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn conversation(row: ConversationSummaryRow) -> ConversationSummary {
    ConversationSummary {
        id: parse_id(&row.id, "conversation"),
        is_private: row.is_private,
        participants: row.participants.into_iter().map(profile).collect(),
        last_message: row.last_message.map(last_message),
        unread_count: row.unread_count,
        last_read_at: row.last_read_at.as_deref().map(parse_timestamp),
        last_activity_at: parse_timestamp(&row.last_activity_at),
    }
}

pub fn contact(row: ContactRow) -> Contact {
    Contact {
        id: parse_id(&row.id, "contact"),
        user_id: parse_id(&row.user_id, "user"),
        contact_user_id: parse_id(&row.contact_user_id, "user"),
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn contact_detail(row: ContactDetailRow) -> ContactDetail {
    ContactDetail {
        contact: profile(row.contact),
        email: row.email,
        added_at: parse_timestamp(&row.created_at),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2024-03-01T10:20:30.123456+00:00");
        assert_eq!((rfc.year(), rfc.hour(), rfc.nanosecond()), (2024, 10, 123_456_000));

        let sqlite = parse_timestamp("2024-03-01 10:20:30");
        assert_eq!((sqlite.day(), sqlite.minute(), sqlite.second()), (1, 20, 30));

        assert_eq!(parse_timestamp("yesterday"), DateTime::<Utc>::default());
    }

    #[test]
    fn test_corrupt_values_fall_back() {
        assert_eq!(parse_id("nope", "user"), Uuid::default());
        assert_eq!(parse_message_type("video"), MessageType::Text);
        assert_eq!(parse_message_type("image"), MessageType::Image);
    }
}
