use tracing::warn;

use crate::errors::AppError;

pub const LOGIN_MAX_ATTEMPTS: i64 = 10;
pub const LOGIN_WINDOW_SECS: i64 = 60;
pub const REGISTER_MAX_ATTEMPTS: i64 = 5;
pub const REGISTER_WINDOW_SECS: i64 = 3600;

fn login_key(email: &str) -> String {
    format!("rate:login:{}", email.to_lowercase())
}

fn register_key(email: &str) -> String {
    format!("rate:register:{}", email.to_lowercase())
}

/// Registration requests per email, same fail-open counter as login.
pub async fn check_registration_rate(redis: &redis::Client, email: &str) -> Result<(), AppError> {
    let attempts = match incr_with_window(redis, &register_key(email), REGISTER_WINDOW_SECS).await {
        Ok(count) => count,
        Err(e) => {
            warn!("Registration rate limiter unavailable: {e}");
            return Ok(());
        }
    };

    if attempts > REGISTER_MAX_ATTEMPTS {
        return Err(AppError::RateLimited(
            "Too many registration attempts; try again later".to_string(),
        ));
    }
    Ok(())
}

/// Fixed-window counter per email. Redis outages fail open.
pub async fn check_login_rate(redis: &redis::Client, email: &str) -> Result<(), AppError> {
    let key = login_key(email);
    let attempts = match incr_with_window(redis, &key, LOGIN_WINDOW_SECS).await {
        Ok(count) => count,
        Err(e) => {
            warn!("Login rate limiter unavailable: {e}");
            return Ok(());
        }
    };

    if attempts > LOGIN_MAX_ATTEMPTS {
        return Err(AppError::RateLimited(format!(
            "Too many login attempts; try again in {LOGIN_WINDOW_SECS} seconds"
        )));
    }
    Ok(())
}

/// Clears the counter after a successful login.
pub async fn reset_login_rate(redis: &redis::Client, email: &str) {
    let result = async {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        redis::cmd("DEL")
            .arg(login_key(email))
            .query_async::<_, ()>(&mut conn)
            .await
    }
    .await;
    if let Err(e) = result {
        warn!("Failed to reset login rate counter: {e}");
    }
}

async fn incr_with_window(redis: &redis::Client, key: &str, window_secs: i64) -> redis::RedisResult<i64> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
    if count == 1 {
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_case_insensitive() {
        assert_eq!(login_key("HR@Acme.Test"), "rate:login:hr@acme.test");
        assert_eq!(register_key("HR@Acme.Test"), "rate:register:hr@acme.test");
    }

    #[tokio::test]
    async fn unreachable_redis_fails_open() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        assert!(check_login_rate(&client, "a@b.c").await.is_ok());
        assert!(check_registration_rate(&client, "a@b.c").await.is_ok());
    }
}
