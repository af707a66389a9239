use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use waddle_core::types::CommunityId;

use crate::error::Result;
use crate::score::{compute, is_stale};
use crate::types::{BotScore, Grade, ScoreComponents, SizeCategory};

/// Persists bot scores with a `next_recalculation` staleness marker. A read
/// that finds a stale row recomputes on the spot rather than serving decayed
/// data.
pub struct BotScoreStore {
    db: Mutex<Connection>,
}

impl BotScoreStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn upsert(&self, score: &BotScore) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO bot_scores (community_id, user_id, bad_actor, reputation, security, ai_behavioral,
                composite, grade, size_category, computed_at, next_recalculation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(community_id, user_id) DO UPDATE SET
                bad_actor = excluded.bad_actor, reputation = excluded.reputation,
                security = excluded.security, ai_behavioral = excluded.ai_behavioral,
                composite = excluded.composite, grade = excluded.grade,
                size_category = excluded.size_category, computed_at = excluded.computed_at,
                next_recalculation = excluded.next_recalculation",
            params![
                score.community_id.0,
                score.user_id,
                score.components.bad_actor,
                score.components.reputation,
                score.components.security,
                score.components.ai_behavioral,
                score.composite,
                format!("{:?}", score.grade),
                format!("{:?}", score.size_category),
                score.computed_at,
                score.next_recalculation,
            ],
        )?;
        Ok(())
    }

    fn fetch(&self, community_id: CommunityId, user_id: &str) -> Result<Option<BotScore>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT bad_actor, reputation, security, ai_behavioral, composite, grade, size_category,
                        computed_at, next_recalculation
                 FROM bot_scores WHERE community_id = ?1 AND user_id = ?2",
                params![community_id.0, user_id],
                |r| {
                    Ok((
                        r.get::<_, f64>(0)?,
                        r.get::<_, f64>(1)?,
                        r.get::<_, f64>(2)?,
                        r.get::<_, f64>(3)?,
                        r.get::<_, f64>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, String>(6)?,
                        r.get::<_, String>(7)?,
                        r.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(bad_actor, reputation, security, ai_behavioral, composite, grade, size_category, computed_at, next_recalculation)| {
                BotScore {
                    community_id,
                    user_id: user_id.to_string(),
                    components: ScoreComponents { bad_actor, reputation, security, ai_behavioral },
                    composite,
                    grade: parse_grade(&grade),
                    size_category: parse_size(&size_category),
                    computed_at,
                    next_recalculation,
                }
            },
        ))
    }

    /// Read with transparent recompute-on-stale. `recompute` is supplied by
    /// the caller since it needs fresh windowed-activity data this store
    /// doesn't own.
    pub fn get_or_recompute(
        &self,
        community_id: CommunityId,
        user_id: &str,
        recompute: impl FnOnce() -> (ScoreComponents, u64),
    ) -> Result<BotScore> {
        let now = Utc::now();
        if let Some(existing) = self.fetch(community_id, user_id)? {
            if !is_stale(&existing, now) {
                return Ok(existing);
            }
            debug!(user_id, "bot score stale, recomputing");
        }
        let (components, active_users) = recompute();
        let fresh = compute(community_id, user_id, components, active_users, now);
        self.upsert(&fresh)?;
        Ok(fresh)
    }

    /// Supplemental operational-visibility operation: users whose composite
    /// score implies likely bot behavior, for moderator review.
    pub fn get_suspected_bots(&self, community_id: CommunityId, threshold: f64) -> Result<Vec<BotScore>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT user_id, bad_actor, reputation, security, ai_behavioral, composite, grade, size_category,
                    computed_at, next_recalculation
             FROM bot_scores WHERE community_id = ?1 AND composite >= ?2
             ORDER BY composite DESC",
        )?;
        let rows = stmt.query_map(params![community_id.0, threshold], |r| {
            Ok(BotScore {
                community_id,
                user_id: r.get(0)?,
                components: ScoreComponents {
                    bad_actor: r.get(1)?,
                    reputation: r.get(2)?,
                    security: r.get(3)?,
                    ai_behavioral: r.get(4)?,
                },
                composite: r.get(5)?,
                grade: parse_grade(&r.get::<_, String>(6)?),
                size_category: parse_size(&r.get::<_, String>(7)?),
                computed_at: r.get(8)?,
                next_recalculation: r.get(9)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn mark_bot_reviewed(&self, community_id: CommunityId, user_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE bot_scores SET reviewed = 1 WHERE community_id = ?1 AND user_id = ?2",
            params![community_id.0, user_id],
        )?;
        Ok(())
    }
}

fn parse_grade(s: &str) -> Grade {
    match s {
        "A" => Grade::A,
        "B" => Grade::B,
        "C" => Grade::C,
        "D" => Grade::D,
        _ => Grade::F,
    }
}

fn parse_size(s: &str) -> SizeCategory {
    match s {
        "Small" => SizeCategory::Small,
        "Medium" => SizeCategory::Medium,
        _ => SizeCategory::Large,
    }
}

fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bot_scores (
            community_id      INTEGER NOT NULL,
            user_id           TEXT NOT NULL,
            bad_actor         REAL NOT NULL,
            reputation        REAL NOT NULL,
            security          REAL NOT NULL,
            ai_behavioral     REAL NOT NULL,
            composite         REAL NOT NULL,
            grade             TEXT NOT NULL,
            size_category     TEXT NOT NULL,
            computed_at       TEXT NOT NULL,
            next_recalculation TEXT NOT NULL,
            reviewed          INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (community_id, user_id)
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> BotScoreStore {
        BotScoreStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn fresh_score_is_not_recomputed() {
        let store = store();
        let mut calls = 0;
        store
            .get_or_recompute(CommunityId(1), "u1", || {
                calls += 1;
                (ScoreComponents { bad_actor: 10.0, ..Default::default() }, 20)
            })
            .unwrap();
        store
            .get_or_recompute(CommunityId(1), "u1", || {
                calls += 1;
                (ScoreComponents::default(), 20)
            })
            .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn suspected_bots_filters_by_threshold() {
        let store = store();
        store
            .get_or_recompute(CommunityId(1), "bad-actor", || {
                (ScoreComponents { bad_actor: 100.0, reputation: 100.0, security: 100.0, ai_behavioral: 100.0 }, 20)
            })
            .unwrap();
        store
            .get_or_recompute(CommunityId(1), "good-actor", || (ScoreComponents::default(), 20))
            .unwrap();
        let suspects = store.get_suspected_bots(CommunityId(1), 80.0).unwrap();
        assert_eq!(suspects.len(), 1);
        assert_eq!(suspects[0].user_id, "bad-actor");
    }
}
