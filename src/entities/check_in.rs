use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of one wellness check-in call. Shared by the API and the store;
/// conversion to the persisted string happens only at the sea-orm boundary.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Deserialize, Serialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "NO_ANSWER")]
    NoAnswer,
    #[sea_orm(string_value = "OK")]
    Ok,
    #[sea_orm(string_value = "CONCERN")]
    Concern,
    #[sea_orm(string_value = "EMERGENCY")]
    Emergency,
}

impl CheckInStatus {
    /// Every status except `Pending` is terminal; terminal records are
    /// immutable apart from audit notes.
    pub fn is_terminal(self) -> bool {
        !matches!(self, CheckInStatus::Pending)
    }

    /// The persisted/API spelling, also used as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckInStatus::Pending => "PENDING",
            CheckInStatus::NoAnswer => "NO_ANSWER",
            CheckInStatus::Ok => "OK",
            CheckInStatus::Concern => "CONCERN",
            CheckInStatus::Emergency => "EMERGENCY",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "check_ins")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub recipient_id: i32,
    pub status: CheckInStatus,
    /// Twilio Call SID, assigned once the outbound call is placed.
    #[sea_orm(unique, nullable)]
    pub call_sid: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub script: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub transcript: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub ai_notes: Option<String>,
    pub created_at: DateTime,
    pub completed_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::recipient::Entity",
        from = "Column::RecipientId",
        to = "super::recipient::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Recipient,
}

impl Related<super::recipient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::CheckInStatus;

    #[test]
    fn pending_is_the_only_non_terminal_status() {
        assert!(!CheckInStatus::Pending.is_terminal());
        assert!(CheckInStatus::NoAnswer.is_terminal());
        assert!(CheckInStatus::Ok.is_terminal());
        assert!(CheckInStatus::Concern.is_terminal());
        assert!(CheckInStatus::Emergency.is_terminal());
    }

    #[test]
    fn status_serializes_as_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&CheckInStatus::NoAnswer).unwrap(),
            "\"NO_ANSWER\""
        );
        assert_eq!(serde_json::to_string(&CheckInStatus::Ok).unwrap(), "\"OK\"");
    }
}
