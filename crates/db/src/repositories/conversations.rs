use sqlx::{sqlite::SqliteRow, Row};

use artibot_core::dialogue::{
    ActionType, CollectedData, ConversationId, ConversationState, SlotKey, Step,
};
use artibot_core::domain::tenant::TenantId;

use super::rows::{parse_bool, parse_timestamp};
use super::{ConversationStateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationStateRepository {
    pool: DbPool,
}

impl SqlConversationStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationStateRepository for SqlConversationStateRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                conversation_id,
                tenant_id,
                current_step,
                action_type,
                collected_json,
                missing_fields_json,
                pending_confirmation,
                confirmation_type,
                state_version,
                created_at,
                updated_at
             FROM conversation_state
             WHERE conversation_id = ? AND tenant_id = ?",
        )
        .bind(&conversation_id.0)
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(state_from_row).transpose()
    }

    async fn insert(&self, state: ConversationState) -> Result<bool, RepositoryError> {
        let collected_json = encode_collected(state.collected.as_ref())?;
        let missing_fields_json = encode_missing(&state.missing_fields)?;

        let result = sqlx::query(
            "INSERT INTO conversation_state (
                conversation_id,
                tenant_id,
                current_step,
                action_type,
                collected_json,
                missing_fields_json,
                pending_confirmation,
                confirmation_type,
                state_version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&state.conversation_id.0)
        .bind(&state.tenant_id.0)
        .bind(state.current_step.map(|step| step.as_str()))
        .bind(state.action_type.map(|action| action.as_str()))
        .bind(collected_json.as_deref())
        .bind(&missing_fields_json)
        .bind(i64::from(state.pending_confirmation))
        .bind(state.confirmation_type.as_deref())
        .bind(state.state_version)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn update(&self, state: ConversationState) -> Result<bool, RepositoryError> {
        let collected_json = encode_collected(state.collected.as_ref())?;
        let missing_fields_json = encode_missing(&state.missing_fields)?;

        let result = sqlx::query(
            "UPDATE conversation_state SET
                current_step = ?,
                action_type = ?,
                collected_json = ?,
                missing_fields_json = ?,
                pending_confirmation = ?,
                confirmation_type = ?,
                state_version = state_version + 1,
                updated_at = ?
             WHERE conversation_id = ? AND tenant_id = ? AND state_version = ?",
        )
        .bind(state.current_step.map(|step| step.as_str()))
        .bind(state.action_type.map(|action| action.as_str()))
        .bind(collected_json.as_deref())
        .bind(&missing_fields_json)
        .bind(i64::from(state.pending_confirmation))
        .bind(state.confirmation_type.as_deref())
        .bind(state.updated_at.to_rfc3339())
        .bind(&state.conversation_id.0)
        .bind(&state.tenant_id.0)
        .bind(state.state_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn encode_collected(collected: Option<&CollectedData>) -> Result<Option<String>, RepositoryError> {
    collected
        .map(|data| {
            serde_json::to_string(data).map_err(|error| {
                RepositoryError::Encode(format!("collected data did not serialize: {error}"))
            })
        })
        .transpose()
}

fn encode_missing(missing: &[SlotKey]) -> Result<String, RepositoryError> {
    serde_json::to_string(missing).map_err(|error| {
        RepositoryError::Encode(format!("missing fields did not serialize: {error}"))
    })
}

fn state_from_row(row: SqliteRow) -> Result<ConversationState, RepositoryError> {
    let current_step = row
        .try_get::<Option<String>, _>("current_step")?
        .map(|value| {
            Step::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown step `{value}`")))
        })
        .transpose()?;

    let action_type = row
        .try_get::<Option<String>, _>("action_type")?
        .map(|value| {
            ActionType::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown action type `{value}`")))
        })
        .transpose()?;

    let collected = row
        .try_get::<Option<String>, _>("collected_json")?
        .map(|raw| {
            serde_json::from_str::<CollectedData>(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid collected_json: {error}"))
            })
        })
        .transpose()?;

    let missing_raw = row.try_get::<String, _>("missing_fields_json")?;
    let missing_fields = serde_json::from_str(&missing_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid missing_fields_json: {error}"))
    })?;

    Ok(ConversationState {
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        current_step,
        action_type,
        collected,
        missing_fields,
        pending_confirmation: parse_bool(
            "pending_confirmation",
            row.try_get("pending_confirmation")?,
        )?,
        confirmation_type: row.try_get("confirmation_type")?,
        state_version: row.try_get("state_version")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
