//! Config profiles and inbound resolution.
//!
//! Resolution answers two questions for the dispatcher: which inbounds a
//! user may use (through group membership), and which users belong on a
//! profile's inbounds when a node starts.

use std::collections::{HashMap, HashSet};

use sqlx::Row;

use crate::backend::{Ledger, parse_credentials, parse_inbound_row};
use crate::error::LedgerError;
use crate::model::{InboundRecord, NewInbound, ResolvedProfile, ResolvedUser, UserCredentials};
use crate::queries;

/// Users per `IN (..)` lookup.
const RESOLVE_CHUNK: usize = 1000;

impl Ledger {
    pub async fn create_profile(
        &self,
        uuid: &str,
        name: &str,
        config: &serde_json::Value,
    ) -> Result<(), LedgerError> {
        sqlx::query(&self.sql(queries::INSERT_PROFILE))
            .bind(uuid)
            .bind(name)
            .bind(config.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Add an inbound to a profile at `position`.
    pub async fn add_profile_inbound(
        &self,
        profile_uuid: &str,
        inbound: &NewInbound,
        position: i64,
    ) -> Result<(), LedgerError> {
        sqlx::query(&self.sql(queries::INSERT_INBOUND))
            .bind(&inbound.uuid)
            .bind(profile_uuid)
            .bind(&inbound.tag)
            .bind(&inbound.protocol)
            .bind(inbound.network.as_deref())
            .bind(inbound.security.as_deref())
            .bind(inbound.method.as_deref())
            .bind(position)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Grant an inbound to every member of a group.
    pub async fn grant_group_inbound(
        &self,
        group_uuid: &str,
        inbound_uuid: &str,
    ) -> Result<(), LedgerError> {
        sqlx::query(&self.sql(queries::ADD_GROUP_INBOUND))
            .bind(group_uuid)
            .bind(inbound_uuid)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Credentials, status and granted inbounds of one user.
    ///
    /// `None` when the user does not exist.
    pub async fn resolve_user(&self, t_id: i64) -> Result<Option<ResolvedUser>, LedgerError> {
        Ok(self.resolve_users(&[t_id]).await?.into_iter().next())
    }

    /// Bulk variant of [`Ledger::resolve_user`]; unknown ids are skipped.
    pub async fn resolve_users(&self, t_ids: &[i64]) -> Result<Vec<ResolvedUser>, LedgerError> {
        let mut resolved = Vec::with_capacity(t_ids.len());

        for chunk in t_ids.chunks(RESOLVE_CHUNK) {
            let statement = queries::select_users_by_ids(chunk.len());
            let statement = self.sql(&statement);
            let mut query = sqlx::query(&statement);
            for t_id in chunk {
                query = query.bind(*t_id);
            }
            let user_rows = query.fetch_all(self.pool()).await?;

            let statement = queries::user_inbounds(chunk.len());
            let statement = self.sql(&statement);
            let mut query = sqlx::query(&statement);
            for t_id in chunk {
                query = query.bind(*t_id);
            }
            let inbound_rows = query.fetch_all(self.pool()).await?;

            let mut inbounds: HashMap<i64, Vec<InboundRecord>> = HashMap::new();
            for row in &inbound_rows {
                let t_id: i64 = row.try_get("t_id")?;
                inbounds
                    .entry(t_id)
                    .or_default()
                    .push(parse_inbound_row(row)?);
            }

            for row in &user_rows {
                let status: String = row.try_get("status")?;
                let credentials = parse_credentials(row)?;
                resolved.push(ResolvedUser {
                    inbounds: inbounds.remove(&credentials.t_id).unwrap_or_default(),
                    status: status.parse()?,
                    credentials,
                });
            }
        }
        Ok(resolved)
    }

    /// Profile config plus the active users of each requested inbound.
    ///
    /// `tags` restricts the result to inbounds with those tags; `None`
    /// keeps every inbound of the profile. `None` is returned when the
    /// profile does not exist.
    pub async fn resolve_profile(
        &self,
        profile_uuid: &str,
        tags: Option<&HashSet<String>>,
    ) -> Result<Option<ResolvedProfile>, LedgerError> {
        let Some(row) = sqlx::query(&self.sql(queries::SELECT_PROFILE))
            .bind(profile_uuid)
            .fetch_optional(self.pool())
            .await?
        else {
            return Ok(None);
        };
        let config_text: String = row.try_get("config")?;
        let config = serde_json::from_str(&config_text).map_err(LedgerError::decode)?;

        let inbound_rows = sqlx::query(&self.sql(queries::PROFILE_INBOUNDS))
            .bind(profile_uuid)
            .fetch_all(self.pool())
            .await?;
        let user_rows = sqlx::query(&self.sql(queries::PROFILE_INBOUND_USERS))
            .bind(profile_uuid)
            .fetch_all(self.pool())
            .await?;

        let mut users: HashMap<String, Vec<UserCredentials>> = HashMap::new();
        for row in &user_rows {
            let inbound_uuid: String = row.try_get("inbound_uuid")?;
            users
                .entry(inbound_uuid)
                .or_default()
                .push(parse_credentials(row)?);
        }

        let mut inbounds = Vec::new();
        for row in &inbound_rows {
            let inbound = parse_inbound_row(row)?;
            if tags.is_some_and(|tags| !tags.contains(&inbound.tag)) {
                continue;
            }
            let members = users.remove(&inbound.uuid).unwrap_or_default();
            inbounds.push((inbound, members));
        }

        Ok(Some(ResolvedProfile {
            uuid: row.try_get("uuid")?,
            name: row.try_get("name")?,
            config,
            inbounds,
        }))
    }
}
