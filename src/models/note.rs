use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::services::calendar::CalendarPeriod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    #[sea_orm(string_value = "day")]
    Day,
    #[sea_orm(string_value = "week")]
    Week,
    #[sea_orm(string_value = "month")]
    Month,
}

impl From<PeriodType> for CalendarPeriod {
    fn from(value: PeriodType) -> Self {
        match value {
            PeriodType::Day => CalendarPeriod::Day,
            PeriodType::Week => CalendarPeriod::Week,
            PeriodType::Month => CalendarPeriod::Month,
        }
    }
}

/// A note is attached either to an occurrence or to a calendar period,
/// never both. Rows keep either `occurrence_id` or the two period columns.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub user_id: Uuid,
    pub occurrence_id: Option<Uuid>,
    pub period_type: Option<PeriodType>,
    pub period_date: Option<ChronoDate>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::occurrence::Entity",
        from = "Column::OccurrenceId",
        to = "super::occurrence::Column::Id",
        on_delete = "Cascade"
    )]
    Occurrence,
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::UserId",
        to = "super::profile::Column::Id",
        on_delete = "Cascade"
    )]
    Profile,
}

impl Related<super::occurrence::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Occurrence.def()
    }
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoteTarget {
    Occurrence {
        occurrence_id: Uuid,
    },
    Period {
        period_type: PeriodType,
        period_date: ChronoDate,
    },
}

impl NoteTarget {
    /// Column values `(occurrence_id, period_type, period_date)` for this target
    pub fn columns(self) -> (Option<Uuid>, Option<PeriodType>, Option<ChronoDate>) {
        match self {
            NoteTarget::Occurrence { occurrence_id } => (Some(occurrence_id), None, None),
            NoteTarget::Period {
                period_type,
                period_date,
            } => (None, Some(period_type), Some(period_date)),
        }
    }
}

impl Model {
    /// `None` only for a row that breaks the one-target rule
    pub fn target(&self) -> Option<NoteTarget> {
        match (self.occurrence_id, self.period_type, self.period_date) {
            (Some(occurrence_id), None, None) => Some(NoteTarget::Occurrence { occurrence_id }),
            (None, Some(period_type), Some(period_date)) => Some(NoteTarget::Period {
                period_type,
                period_date,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn note_with(target: NoteTarget) -> Model {
        let (occurrence_id, period_type, period_date) = target.columns();
        Model {
            id: Uuid::new_v4(),
            content: "felt great".to_string(),
            user_id: Uuid::new_v4(),
            occurrence_id,
            period_type,
            period_date,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_target_survives_columns() {
        let occurrence = NoteTarget::Occurrence {
            occurrence_id: Uuid::new_v4(),
        };
        assert_eq!(note_with(occurrence).target(), Some(occurrence));

        let period = NoteTarget::Period {
            period_type: PeriodType::Week,
            period_date: NaiveDate::from_ymd_opt(2022, 6, 13).unwrap(),
        };
        assert_eq!(note_with(period).target(), Some(period));
    }

    #[test]
    fn test_row_with_both_targets_is_rejected() {
        let mut note = note_with(NoteTarget::Occurrence {
            occurrence_id: Uuid::new_v4(),
        });
        note.period_type = Some(PeriodType::Day);
        assert_eq!(note.target(), None);
    }

    #[test]
    fn test_target_json_shape() {
        let json = serde_json::json!({
            "kind": "period",
            "period_type": "month",
            "period_date": "2022-01-01"
        });
        let target: NoteTarget = serde_json::from_value(json).unwrap();
        assert_eq!(
            target,
            NoteTarget::Period {
                period_type: PeriodType::Month,
                period_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            }
        );
    }
}
