//! Redis-backed credential store shared with the SSH server.
//!
//! Members of [`USERS_SET`] are `<uuid>::<authorized key>` strings checked by
//! the server with `SISMEMBER`; [`USERS_USAGE`] is incremented by the server's
//! traffic accounting with `HINCRBY`.

use crate::constants::{USERS_SET, USERS_USAGE};
use crate::core::credstore::CredentialStore;
use crate::error::ClientError;
use crate::models::record::ClientRecord;
use redis::{Client, Commands, Connection, RedisError, Script};
use std::time::Duration;
use tracing::debug;

/// Insert unless some member already carries the identity prefix.
const ADD_SCRIPT: &str = r"
local prefix = ARGV[1] .. '::'
for _, m in ipairs(redis.call('SMEMBERS', KEYS[1])) do
  if string.sub(m, 1, #prefix) == prefix then
    return 0
  end
end
return redis.call('SADD', KEYS[1], prefix .. ARGV[2])
";

/// Remove every member carrying the identity prefix; returns the count.
const REMOVE_SCRIPT: &str = r"
local prefix = ARGV[1] .. '::'
local removed = 0
for _, m in ipairs(redis.call('SMEMBERS', KEYS[1])) do
  if string.sub(m, 1, #prefix) == prefix then
    removed = removed + redis.call('SREM', KEYS[1], m)
  end
end
return removed
";

/// Subtract the current value and return it, in one step.
const RESET_SCRIPT: &str = r"
local value = tonumber(redis.call('HGET', KEYS[1], ARGV[1]) or '0')
if value ~= 0 then
  redis.call('HINCRBY', KEYS[1], ARGV[1], -value)
end
return value
";

pub struct RedisStore {
    conn: Connection,
    add: Script,
    remove: Script,
    reset: Script,
}

impl RedisStore {
    /// Connect to `url`; `timeout` bounds the connect and every round trip.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::open(url).map_err(|e| ClientError::InvalidConfiguration {
            name: "REDIS_URL".to_string(),
            reason: e.to_string(),
        })?;
        let conn = client
            .get_connection_with_timeout(timeout)
            .map_err(store_error)?;
        conn.set_read_timeout(Some(timeout)).map_err(store_error)?;
        conn.set_write_timeout(Some(timeout)).map_err(store_error)?;
        debug!("connected to redis (timeout {:?})", timeout);
        Ok(Self {
            conn,
            add: Script::new(ADD_SCRIPT),
            remove: Script::new(REMOVE_SCRIPT),
            reset: Script::new(RESET_SCRIPT),
        })
    }
}

impl CredentialStore for RedisStore {
    fn add_record(&mut self, identity: &str, public_key: &str) -> Result<(), ClientError> {
        let added: i64 = self
            .add
            .key(USERS_SET)
            .arg(identity)
            .arg(public_key)
            .invoke(&mut self.conn)
            .map_err(store_error)?;
        if added != 1 {
            return Err(ClientError::DuplicateClient(identity.to_string()));
        }
        Ok(())
    }

    fn remove_record(&mut self, identity: &str) -> Result<(), ClientError> {
        let removed: i64 = self
            .remove
            .key(USERS_SET)
            .arg(identity)
            .invoke(&mut self.conn)
            .map_err(store_error)?;
        if removed == 0 {
            return Err(ClientError::ClientNotFound(identity.to_string()));
        }
        if removed > 1 {
            debug!("removed {} records for {}", removed, identity);
        }
        Ok(())
    }

    fn list_records(&mut self) -> Result<Vec<ClientRecord>, ClientError> {
        let members: Vec<String> = self.conn.smembers(USERS_SET).map_err(store_error)?;
        Ok(members.iter().map(|m| ClientRecord::from_member(m)).collect())
    }

    fn get_usage(&mut self, identity: &str) -> Result<i64, ClientError> {
        let value: Option<i64> = self
            .conn
            .hget(USERS_USAGE, identity)
            .map_err(store_error)?;
        Ok(value.unwrap_or(0))
    }

    fn reset_usage(&mut self, identity: &str) -> Result<i64, ClientError> {
        self.reset
            .key(USERS_USAGE)
            .arg(identity)
            .invoke(&mut self.conn)
            .map_err(store_error)
    }

    fn persist(&mut self) -> Result<(), ClientError> {
        redis::cmd("SAVE")
            .query::<()>(&mut self.conn)
            .map_err(store_error)
    }

    fn ping(&mut self) -> Result<(), ClientError> {
        let reply: String = redis::cmd("PING")
            .query(&mut self.conn)
            .map_err(store_error)?;
        if reply != "PONG" {
            return Err(ClientError::StoreUnavailable(format!(
                "unexpected PING reply '{}'",
                reply
            )));
        }
        Ok(())
    }
}

/// Transport failures mean the store is unavailable; anything else is a
/// rejected command.
fn store_error(err: RedisError) -> ClientError {
    if err.is_timeout()
        || err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
    {
        ClientError::StoreUnavailable(err.to_string())
    } else {
        ClientError::StoreCommand(err.to_string())
    }
}
