//! User records and per-user mutations.

use tracing::debug;

use crate::backend::{Ledger, now_millis, parse_user_row};
use crate::error::LedgerError;
use crate::model::{NewUser, UserRecord, UserStatus};
use crate::queries;

/// Compare-and-swap attempts before a rotation gives up.
const ROTATE_ATTEMPTS: usize = 5;

impl Ledger {
    /// Insert a user and return its `t_id`.
    pub async fn create_user(&self, user: &NewUser) -> Result<i64, LedgerError> {
        let t_id: i64 = sqlx::query_scalar(&self.sql(queries::INSERT_USER))
            .bind(&user.uuid)
            .bind(&user.username)
            .bind(&user.ss_password)
            .bind(&user.trojan_password)
            .bind(&user.vless_uuid)
            .bind(user.status.as_str())
            .bind(user.expire_at)
            .bind(user.traffic_limit_bytes)
            .bind(user.traffic_limit_strategy.as_str())
            .bind(now_millis())
            .fetch_one(self.pool())
            .await?;
        Ok(t_id)
    }

    pub async fn get_user(&self, t_id: i64) -> Result<Option<UserRecord>, LedgerError> {
        let row = sqlx::query(&self.sql(queries::SELECT_USER_BY_ID))
            .bind(t_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(parse_user_row).transpose()
    }

    pub async fn get_user_by_uuid(&self, uuid: &str) -> Result<Option<UserRecord>, LedgerError> {
        let row = sqlx::query(&self.sql(queries::SELECT_USER_BY_UUID))
            .bind(uuid)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(parse_user_row).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, LedgerError> {
        let rows = sqlx::query(queries::LIST_USERS)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(parse_user_row).collect()
    }

    /// Set a user's status directly (admin enable/disable).
    pub async fn set_user_status(&self, t_id: i64, status: UserStatus) -> Result<(), LedgerError> {
        let result = sqlx::query(&self.sql(queries::SET_USER_STATUS))
            .bind(status.as_str())
            .bind(t_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("user {t_id}")));
        }
        Ok(())
    }

    /// Replace a user's protocol secrets, returning the previous VLESS key.
    ///
    /// The write is a compare-and-swap on the key that was read, so two
    /// concurrent rotations never report the same previous key.
    pub async fn rotate_credentials(
        &self,
        t_id: i64,
        vless_uuid: &str,
        trojan_password: &str,
        ss_password: &str,
    ) -> Result<String, LedgerError> {
        for _ in 0..ROTATE_ATTEMPTS {
            let previous = self
                .get_user(t_id)
                .await?
                .ok_or_else(|| LedgerError::NotFound(format!("user {t_id}")))?
                .vless_uuid;
            let credentials = (vless_uuid, trojan_password, ss_password);
            if self.swap_credentials(t_id, &previous, credentials).await? {
                return Ok(previous);
            }
            debug!(t_id, "credentials changed concurrently, retrying rotation");
        }
        Err(LedgerError::Conflict(format!("user {t_id} credentials")))
    }

    /// Write `(vless, trojan, shadowsocks)` secrets if the stored VLESS key
    /// is still `expected`.
    pub(crate) async fn swap_credentials(
        &self,
        t_id: i64,
        expected: &str,
        (vless_uuid, trojan_password, ss_password): (&str, &str, &str),
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(&self.sql(queries::SWAP_USER_CREDENTIALS))
            .bind(vless_uuid)
            .bind(trojan_password)
            .bind(ss_password)
            .bind(t_id)
            .bind(expected)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Add a user to an access group.
    pub async fn add_user_to_group(&self, t_id: i64, group_uuid: &str) -> Result<(), LedgerError> {
        sqlx::query(&self.sql(queries::ADD_USER_GROUP))
            .bind(t_id)
            .bind(group_uuid)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Zero a user's period usage and watermark, keeping lifetime usage.
    ///
    /// Returns `true` when the user was Limited and is now Active again.
    pub async fn reset_user_traffic(&self, t_id: i64) -> Result<bool, LedgerError> {
        let mut tx = self.pool().begin().await?;

        let reactivated = sqlx::query(&self.sql(queries::REACTIVATE_USER))
            .bind(t_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

        let result = sqlx::query(&self.sql(queries::RESET_USER_COUNTERS))
            .bind(now_millis())
            .bind(t_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("user {t_id}")));
        }

        tx.commit().await?;
        Ok(reactivated)
    }
}
