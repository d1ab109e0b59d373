use std::collections::HashMap;
use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::{
    domain::PlanCode,
    error::{AppError, Result},
};

/// Compiled-in price table, used when the settings store is unreachable
/// or has no row for a plan. Whole rupees.
const DEFAULT_PRICES: [(PlanCode, i64); 5] = [
    (PlanCode::OneMonth, 1500),
    (PlanCode::TwoMonth, 2800),
    (PlanCode::ThreeMonth, 4000),
    (PlanCode::SixMonth, 7500),
    (PlanCode::Yearly, 8000),
];

struct CachedPrices {
    fetched_at: Instant,
    prices: HashMap<PlanCode, i64>,
}

/// Read-through plan pricing over the `app_settings` table. Prices are
/// cached for a bounded window so admin edits land without a restart,
/// and a storage failure degrades to [`DEFAULT_PRICES`] instead of
/// failing the calling operation.
pub struct PlanCatalog {
    pool: SqlitePool,
    ttl: Duration,
    cache: RwLock<Option<CachedPrices>>,
}

impl PlanCatalog {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            cache: RwLock::new(None),
        }
    }

    pub async fn resolve_price(&self, plan: PlanCode) -> i64 {
        let prices = self.current_prices().await;
        prices
            .get(&plan)
            .copied()
            .unwrap_or_else(|| default_price(plan))
    }

    pub fn resolve_duration(plan: PlanCode) -> u32 {
        plan.months()
    }

    /// Admin price edit. Writes through to the settings store and drops
    /// the cache so the next read sees the new value immediately.
    pub async fn set_price(&self, plan: PlanCode, amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "Plan price must be positive".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, category, updated_at)
            VALUES (?, ?, 'pricing', CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(format!("pricing.{}", plan.as_str()))
        .bind(amount.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        *self.cache.write().await = None;
        Ok(())
    }

    pub async fn all_prices(&self) -> HashMap<PlanCode, i64> {
        let mut prices = self.current_prices().await;
        for (plan, amount) in DEFAULT_PRICES {
            prices.entry(plan).or_insert(amount);
        }
        prices
    }

    async fn current_prices(&self) -> HashMap<PlanCode, i64> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return cached.prices.clone();
                }
            }
        }

        match self.load_prices().await {
            Ok(prices) => {
                *self.cache.write().await = Some(CachedPrices {
                    fetched_at: Instant::now(),
                    prices: prices.clone(),
                });
                prices
            }
            Err(e) => {
                tracing::warn!("Plan pricing store unavailable, using defaults: {}", e);
                // Keep serving a stale cache if one exists; otherwise the
                // static table.
                let cache = self.cache.read().await;
                match cache.as_ref() {
                    Some(cached) => cached.prices.clone(),
                    None => DEFAULT_PRICES.into_iter().collect(),
                }
            }
        }
    }

    async fn load_prices(&self) -> Result<HashMap<PlanCode, i64>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM app_settings WHERE category = 'pricing'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut prices = HashMap::new();
        for (key, value) in rows {
            let Some(code) = key.strip_prefix("pricing.") else {
                continue;
            };
            let Some(plan) = PlanCode::from_str(code) else {
                tracing::warn!("Ignoring pricing row for unknown plan: {}", key);
                continue;
            };
            match value.parse::<i64>() {
                Ok(amount) => {
                    prices.insert(plan, amount);
                }
                Err(_) => {
                    tracing::warn!("Ignoring non-numeric price for {}: {}", key, value);
                }
            }
        }
        Ok(prices)
    }
}

fn default_price(plan: PlanCode) -> i64 {
    DEFAULT_PRICES
        .iter()
        .find(|(p, _)| *p == plan)
        .map(|(_, amount)| *amount)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn resolves_seeded_prices() {
        let catalog = PlanCatalog::new(test_pool().await, Duration::from_secs(300));
        assert_eq!(catalog.resolve_price(PlanCode::OneMonth).await, 1500);
        assert_eq!(catalog.resolve_price(PlanCode::Yearly).await, 8000);
    }

    #[tokio::test]
    async fn price_edit_visible_after_cache_invalidation() {
        let catalog = PlanCatalog::new(test_pool().await, Duration::from_secs(300));
        assert_eq!(catalog.resolve_price(PlanCode::SixMonth).await, 7500);

        catalog.set_price(PlanCode::SixMonth, 9000).await.unwrap();
        assert_eq!(catalog.resolve_price(PlanCode::SixMonth).await, 9000);
    }

    #[tokio::test]
    async fn missing_row_falls_back_to_default() {
        let pool = test_pool().await;
        sqlx::query("DELETE FROM app_settings WHERE key = 'pricing.2month'")
            .execute(&pool)
            .await
            .unwrap();

        let catalog = PlanCatalog::new(pool, Duration::from_secs(300));
        assert_eq!(catalog.resolve_price(PlanCode::TwoMonth).await, 2800);
    }

    #[tokio::test]
    async fn storage_failure_degrades_to_defaults() {
        let pool = test_pool().await;
        sqlx::query("DROP TABLE app_settings")
            .execute(&pool)
            .await
            .unwrap();

        let catalog = PlanCatalog::new(pool, Duration::from_secs(300));
        assert_eq!(catalog.resolve_price(PlanCode::ThreeMonth).await, 4000);
    }

    #[test]
    fn durations_follow_plan_codes() {
        assert_eq!(PlanCatalog::resolve_duration(PlanCode::OneMonth), 1);
        assert_eq!(PlanCatalog::resolve_duration(PlanCode::Yearly), 12);
    }
}
