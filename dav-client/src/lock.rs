//! LOCK, lock refresh and UNLOCK (RFC 4918 §9.10, §9.11).
use http::StatusCode;

use dav_proto::decoder::deserialize;
use dav_proto::error::ParsingError;
use dav_proto::headers::{self, DavHeader, LockCondition, ScopeDepth, Timeouts};
use dav_proto::types as dav;

use crate::client::{DavResponse, WebDavClient};
use crate::error::Error;
use crate::transport::empty_body;

/// What a successful LOCK hands back: the token to present on later
/// writes, and the lock as the server describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Lock {
    pub token: dav::LockToken,
    pub active: dav::ActiveLock,
}

impl WebDavClient {
    /// Create a lock. The depth is validated before anything is sent.
    pub async fn lock(
        &self,
        target: &str,
        timeouts: &Timeouts,
        depth: dav::Depth,
        info: &dav::LockInfo,
    ) -> Result<DavResponse<Lock>, Error> {
        let headers = vec![ScopeDepth(depth).to_header()?, timeouts.to_header()?];
        let url = self.resolve(target, false)?;

        let resp = self
            .send_xml(headers::LOCK.clone(), &url, headers, info)
            .await?;
        let resp = Self::collect(resp).await?;

        let header_token = match resp.headers.get(headers::LOCK_TOKEN) {
            Some(value) => Some(dav::LockToken::from_header(value).map_err(|e| {
                tracing::warn!(uri=%url, err=%e, "unreadable Lock-Token header");
                ParsingError::InvalidValue
            })?),
            None => None,
        };
        let locks = lock_discovery(&resp.body).await?;

        let active = match &header_token {
            Some(token) => locks
                .iter()
                .find(|l| l.locktoken.as_ref() == Some(token))
                .or(locks.first()),
            None => locks.first(),
        }
        .cloned()
        .ok_or(ParsingError::MissingChild)?;

        let token = header_token
            .or_else(|| active.locktoken.clone())
            .ok_or(ParsingError::MissingChild)?;

        tracing::info!(uri=%url, token=%token.as_str(), "lock acquired");
        Ok(resp.map(|_| Lock { token, active }))
    }

    /// Extend a lock. Without a token no `If` header is sent, and the
    /// server will most likely refuse.
    pub async fn refresh_lock(
        &self,
        target: &str,
        timeouts: &Timeouts,
        token: Option<&dav::LockToken>,
    ) -> Result<DavResponse<Option<dav::ActiveLock>>, Error> {
        let mut headers = vec![timeouts.to_header()?];
        if let Some(tk) = token {
            headers.push(LockCondition::from(tk.clone()).to_header()?);
        }
        let url = self.resolve(target, false)?;

        let resp = self
            .execute(headers::LOCK.clone(), &url, headers, empty_body())
            .await?;
        let resp = Self::collect(resp).await?;

        let locks = lock_discovery(&resp.body).await?;
        let active = match token {
            Some(tk) => locks
                .iter()
                .find(|l| l.locktoken.as_ref() == Some(tk))
                .or(locks.first()),
            None => locks.first(),
        }
        .cloned();
        Ok(resp.map(|_| active))
    }

    pub async fn unlock(
        &self,
        target: &str,
        token: Option<&dav::LockToken>,
    ) -> Result<DavResponse<()>, Error> {
        let mut headers = vec![];
        if let Some(tk) = token {
            headers.push(tk.to_header()?);
        }
        let url = self.resolve(target, false)?;

        let resp = self
            .execute(headers::UNLOCK.clone(), &url, headers, empty_body())
            .await?;
        let resp = Self::collect(resp).await?;
        if resp.status != StatusCode::NO_CONTENT {
            tracing::debug!(uri=%url, status=%resp.status, "unlock answered with an unusual status");
        }
        Ok(resp.map(|_| ()))
    }
}

/// The activelocks found in a `<D:prop><D:lockdiscovery>` body. A blank
/// body yields none.
async fn lock_discovery(body: &[u8]) -> Result<Vec<dav::ActiveLock>, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(vec![]);
    }
    let prop = deserialize::<dav::Prop>(body).await?;
    Ok(match prop.lockdiscovery {
        Some(dav::Field::Value(locks)) => locks,
        _ => vec![],
    })
}
