/// Reputation engine: aggregates the event ledger into a tier standing
///
/// The profile's `score` column is the authoritative total; the ledger
/// and its rolling subtotals are display data. The only mutation here is
/// the write-through correction of the cached tier.

use crate::{
    db::models::{ReputationEvent, ReputationTier},
    error::{CoreError, CoreResult},
    reputation::{PeriodFilter, Standing, PAGE_SIZE},
};
use chrono::{Duration, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};

/// Reputation engine service
pub struct ReputationEngine {
    db: SqlitePool,
}

impl ReputationEngine {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Compute the standing for a profile
    ///
    /// `period` narrows only the listed ledger window; `page` is clamped
    /// to the nearest valid page.
    pub async fn compute_standing(
        &self,
        profile_id: i64,
        period: PeriodFilter,
        page: i64,
    ) -> CoreResult<Standing> {
        let row = sqlx::query(
            "SELECT score, reputation_tier_id FROM profile WHERE identity_id = ?1",
        )
        .bind(profile_id)
        .fetch_optional(&self.db)
        .await
        .map_err(CoreError::Database)?
        .ok_or_else(|| CoreError::NotFound("Profile not found".to_string()))?;

        let total_score: i64 = row.try_get("score")?;
        let cached_tier_id: i64 = row.try_get("reputation_tier_id")?;

        let tiers = self.load_tiers().await?;
        let (current, next) = resolve_tier(&tiers, total_score)?;
        let progress = progress_percent(total_score, current.min_score, next.map(|t| t.min_score));

        // Write-through correction of the cached tier
        if current.id != cached_tier_id {
            sqlx::query("UPDATE profile SET reputation_tier_id = ?1 WHERE identity_id = ?2")
                .bind(current.id)
                .bind(profile_id)
                .execute(&self.db)
                .await
                .map_err(CoreError::Database)?;
            tracing::info!(
                "Corrected cached tier for profile {} to {}",
                profile_id,
                current.grade
            );
        }

        let today = Utc::now().date_naive();
        let score_30 = self.window_subtotal(profile_id, today, 30).await?;
        let score_60 = self.window_subtotal(profile_id, today, 60).await?;
        let score_90 = self.window_subtotal(profile_id, today, 90).await?;

        let since = period
            .days()
            .map(|d| today - Duration::days(d as i64));

        let total_events = self.count_events(profile_id, since).await?;
        let page_count = ((total_events + PAGE_SIZE - 1) / PAGE_SIZE).max(1);
        let page = page.clamp(1, page_count);
        let events = self.load_page(profile_id, since, page).await?;

        Ok(Standing {
            total_score,
            grade: current.grade.clone(),
            tier_min_score: current.min_score,
            next_grade: next.map(|t| t.grade.clone()),
            next_min_score: next.map(|t| t.min_score),
            progress_percent: progress,
            score_30,
            score_60,
            score_90,
            page,
            page_count,
            total_events,
            events,
        })
    }

    async fn load_tiers(&self) -> CoreResult<Vec<ReputationTier>> {
        let rows = sqlx::query(
            "SELECT id, min_score, grade FROM reputation_tier ORDER BY min_score ASC",
        )
        .fetch_all(&self.db)
        .await
        .map_err(CoreError::Database)?;

        let tiers = rows
            .iter()
            .map(|row| {
                Ok(ReputationTier {
                    id: row.try_get("id")?,
                    min_score: row.try_get("min_score")?,
                    grade: row.try_get("grade")?,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        if tiers.is_empty() {
            return Err(CoreError::Internal("Tier table is empty".to_string()));
        }

        Ok(tiers)
    }

    /// Sum of event points within the trailing window, over the full
    /// (unfiltered) event history.
    async fn window_subtotal(
        &self,
        profile_id: i64,
        today: NaiveDate,
        days: i64,
    ) -> CoreResult<i64> {
        let since = today - Duration::days(days);

        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(rt.points), 0)
             FROM reputation_event re
             JOIN reputation_type rt ON rt.id = re.type_id
             WHERE re.profile_id = ?1 AND re.score_date >= ?2",
        )
        .bind(profile_id)
        .bind(since)
        .fetch_one(&self.db)
        .await
        .map_err(CoreError::Database)?;

        Ok(sum)
    }

    async fn count_events(&self, profile_id: i64, since: Option<NaiveDate>) -> CoreResult<i64> {
        let count: i64 = match since {
            Some(since) => sqlx::query_scalar(
                "SELECT COUNT(*) FROM reputation_event
                 WHERE profile_id = ?1 AND score_date >= ?2",
            )
            .bind(profile_id)
            .bind(since)
            .fetch_one(&self.db)
            .await
            .map_err(CoreError::Database)?,
            None => sqlx::query_scalar(
                "SELECT COUNT(*) FROM reputation_event WHERE profile_id = ?1",
            )
            .bind(profile_id)
            .fetch_one(&self.db)
            .await
            .map_err(CoreError::Database)?,
        };

        Ok(count)
    }

    async fn load_page(
        &self,
        profile_id: i64,
        since: Option<NaiveDate>,
        page: i64,
    ) -> CoreResult<Vec<ReputationEvent>> {
        let offset = (page - 1) * PAGE_SIZE;

        let rows = match since {
            Some(since) => {
                sqlx::query(
                    "SELECT re.id, re.profile_id, rt.name AS type_name, rt.points,
                            re.score_date, re.reason
                     FROM reputation_event re
                     JOIN reputation_type rt ON rt.id = re.type_id
                     WHERE re.profile_id = ?1 AND re.score_date >= ?2
                     ORDER BY re.score_date DESC, re.id DESC
                     LIMIT ?3 OFFSET ?4",
                )
                .bind(profile_id)
                .bind(since)
                .bind(PAGE_SIZE)
                .bind(offset)
                .fetch_all(&self.db)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT re.id, re.profile_id, rt.name AS type_name, rt.points,
                            re.score_date, re.reason
                     FROM reputation_event re
                     JOIN reputation_type rt ON rt.id = re.type_id
                     WHERE re.profile_id = ?1
                     ORDER BY re.score_date DESC, re.id DESC
                     LIMIT ?2 OFFSET ?3",
                )
                .bind(profile_id)
                .bind(PAGE_SIZE)
                .bind(offset)
                .fetch_all(&self.db)
                .await
            }
        }
        .map_err(CoreError::Database)?;

        rows.iter()
            .map(|row| {
                Ok(ReputationEvent {
                    id: row.try_get("id")?,
                    profile_id: row.try_get("profile_id")?,
                    type_name: row.try_get("type_name")?,
                    points: row.try_get("points")?,
                    score_date: row.try_get("score_date")?,
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }
}

/// Resolve the current tier (greatest floor at or below the score) and
/// the next tier up. A score below every floor falls back to the lowest
/// tier.
fn resolve_tier(
    tiers: &[ReputationTier],
    total_score: i64,
) -> CoreResult<(&ReputationTier, Option<&ReputationTier>)> {
    let current = tiers
        .iter()
        .filter(|t| t.min_score <= total_score)
        .last()
        .or_else(|| tiers.first())
        .ok_or_else(|| CoreError::Internal("Tier table is empty".to_string()))?;

    let next = tiers.iter().find(|t| t.min_score > total_score);

    Ok((current, next))
}

/// Progress toward the next tier as a percentage, one decimal, clamped
/// to [0.0, 100.0]. No next tier (or a degenerate range) means 100.0.
fn progress_percent(total_score: i64, current_min: i64, next_min: Option<i64>) -> f64 {
    let Some(next_min) = next_min else {
        return 100.0;
    };

    let range = next_min - current_min;
    if range <= 0 {
        return 100.0;
    }

    let percent = (total_score - current_min) as f64 / range as f64 * 100.0;
    let rounded = (percent * 10.0).round() / 10.0;
    rounded.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn tier(id: i64, min_score: i64, grade: &str) -> ReputationTier {
        ReputationTier {
            id,
            min_score,
            grade: grade.to_string(),
        }
    }

    fn ladder() -> Vec<ReputationTier> {
        vec![tier(1, 0, "F-"), tier(2, 100, "F"), tier(3, 250, "E-")]
    }

    #[test]
    fn test_tier_resolution_midrange() {
        let tiers = ladder();
        let (current, next) = resolve_tier(&tiers, 150).unwrap();
        assert_eq!(current.grade, "F");
        assert_eq!(next.unwrap().grade, "E-");
    }

    #[test]
    fn test_tier_resolution_at_top() {
        let tiers = ladder();
        let (current, next) = resolve_tier(&tiers, 250).unwrap();
        assert_eq!(current.grade, "E-");
        assert!(next.is_none());
    }

    #[test]
    fn test_tier_resolution_below_floor_falls_back() {
        let tiers = ladder();
        let (current, _) = resolve_tier(&tiers, -50).unwrap();
        assert_eq!(current.grade, "F-");
    }

    #[test]
    fn test_tier_resolution_is_monotonic() {
        let tiers = ladder();
        let mut last_floor = i64::MIN;
        for score in (0..400).step_by(10) {
            let (current, _) = resolve_tier(&tiers, score).unwrap();
            assert!(current.min_score >= last_floor);
            last_floor = current.min_score;
        }
    }

    #[test]
    fn test_progress_percent_scenario() {
        // tiers [{F-,0},{F,100},{E-,250}], score 150:
        // (150-100)/(250-100)*100 = 33.3
        assert_eq!(progress_percent(150, 100, Some(250)), 33.3);
    }

    #[test]
    fn test_progress_percent_bounds() {
        assert_eq!(progress_percent(100, 100, Some(250)), 0.0);
        assert_eq!(progress_percent(250, 100, Some(250)), 100.0);
        assert_eq!(progress_percent(300, 0, None), 100.0);
        // Degenerate adjacent tiers
        assert_eq!(progress_percent(100, 100, Some(100)), 100.0);
        // Below the floor clamps rather than going negative
        assert_eq!(progress_percent(-50, 0, Some(100)), 0.0);
    }

    async fn engine_with_profile(score: i64) -> (ReputationEngine, i64, SqlitePool) {
        let pool = db::test_pool().await;
        let identity_id: i64 = sqlx::query_scalar(
            "INSERT INTO identity (username, email, password_hash, created_at)
             VALUES ('pilot', 'pilot@example.com', 'x', ?1) RETURNING id",
        )
        .bind(Utc::now())
        .fetch_one(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO profile (identity_id, first_name, last_name, email,
                                  registration_date, reputation_tier_id, score,
                                  cash_balance_cents, first_access, email_verified,
                                  login_attempts, is_locked)
             VALUES (?1, 'Test', 'Pilot', 'pilot@example.com', ?2,
                     (SELECT id FROM reputation_tier ORDER BY min_score LIMIT 1),
                     ?3, 0, 0, 1, 0, 0)",
        )
        .bind(identity_id)
        .bind(Utc::now().date_naive())
        .bind(score)
        .execute(&pool)
        .await
        .unwrap();
        (ReputationEngine::new(pool.clone()), identity_id, pool)
    }

    async fn add_event(pool: &SqlitePool, profile_id: i64, points: i64, days_ago: i64) {
        use std::sync::atomic::{AtomicI64, Ordering};
        static SEQ: AtomicI64 = AtomicI64::new(0);

        let type_id: i64 = sqlx::query_scalar(
            "INSERT INTO reputation_type (name, description, points)
             VALUES (?1, 'test event', ?2) RETURNING id",
        )
        .bind(format!("test_type_{}", SEQ.fetch_add(1, Ordering::Relaxed)))
        .bind(points)
        .fetch_one(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO reputation_event (profile_id, type_id, score_date, reason)
             VALUES (?1, ?2, ?3, 'test')",
        )
        .bind(profile_id)
        .bind(type_id)
        .bind(Utc::now().date_naive() - Duration::days(days_ago))
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_rolling_subtotals_ignore_period_filter() {
        let (engine, profile_id, pool) = engine_with_profile(999).await;
        add_event(&pool, profile_id, 10, 0).await;
        add_event(&pool, profile_id, 5, 10).await;
        add_event(&pool, profile_id, 3, 45).await;
        add_event(&pool, profile_id, 2, 70).await;

        for period in [PeriodFilter::Days(30), PeriodFilter::All] {
            let standing = engine.compute_standing(profile_id, period, 1).await.unwrap();
            assert_eq!(standing.score_30, 15);
            assert_eq!(standing.score_60, 18);
            assert_eq!(standing.score_90, 20);
            // Total comes from the profile counter, not the ledger
            assert_eq!(standing.total_score, 999);
        }

        // The display window does narrow the listed events
        let narrowed = engine
            .compute_standing(profile_id, PeriodFilter::Days(30), 1)
            .await
            .unwrap();
        assert_eq!(narrowed.events.len(), 2);
        let full = engine
            .compute_standing(profile_id, PeriodFilter::All, 1)
            .await
            .unwrap();
        assert_eq!(full.events.len(), 4);
    }

    #[tokio::test]
    async fn test_write_through_tier_correction() {
        let (engine, profile_id, pool) = engine_with_profile(150).await;

        let standing = engine
            .compute_standing(profile_id, PeriodFilter::All, 1)
            .await
            .unwrap();
        assert_eq!(standing.grade, "F");
        assert_eq!(standing.next_grade.as_deref(), Some("E-"));
        assert_eq!(standing.progress_percent, 33.3);

        // The cached tier id now matches the recomputed tier
        let cached: i64 =
            sqlx::query_scalar("SELECT reputation_tier_id FROM profile WHERE identity_id = ?1")
                .bind(profile_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        let expected: i64 =
            sqlx::query_scalar("SELECT id FROM reputation_tier WHERE grade = 'F'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(cached, expected);
    }

    #[tokio::test]
    async fn test_page_clamping() {
        let (engine, profile_id, pool) = engine_with_profile(0).await;
        for i in 0..35 {
            add_event(&pool, profile_id, i % 7, 0).await;
        }

        let standing = engine
            .compute_standing(profile_id, PeriodFilter::All, 99)
            .await
            .unwrap();
        assert_eq!(standing.page_count, 2);
        assert_eq!(standing.page, 2);
        assert_eq!(standing.events.len(), 5);

        let standing = engine
            .compute_standing(profile_id, PeriodFilter::All, 0)
            .await
            .unwrap();
        assert_eq!(standing.page, 1);
        assert_eq!(standing.events.len(), 30);
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let pool = db::test_pool().await;
        let engine = ReputationEngine::new(pool);
        assert!(matches!(
            engine.compute_standing(404, PeriodFilter::All, 1).await.unwrap_err(),
            CoreError::NotFound(_)
        ));
    }
}
