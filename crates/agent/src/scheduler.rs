use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use skipper_core::skill::{SkillConfig, Trigger};

use crate::SharedRegistry;

const TICK_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum CronError {
    #[error("cron expression must have exactly 5 fields, got {0}")]
    FieldCount(usize),
    #[error("cron expression did not parse: {0}")]
    Parse(String),
}

/// Invoked when a scheduled skill's cron fires. The scheduler passes the
/// current definition, looked up by name at fire time.
#[async_trait]
pub trait SkillTrigger: Send + Sync {
    async fn fire(&self, skill: SkillConfig);
}

struct ScheduledJob {
    skill_name: String,
    schedule: Schedule,
    next_fire: DateTime<Utc>,
}

/// One cron job per scheduled skill, keyed by `skill-{name}` so
/// re-registration replaces instead of duplicating.
pub struct SkillScheduler {
    registry: SharedRegistry,
    jobs: RwLock<HashMap<String, ScheduledJob>>,
    callback: RwLock<Option<Arc<dyn SkillTrigger>>>,
}

/// Validates a 5-field cron expression. The `cron` crate wants a seconds
/// field, so a zero-seconds prefix is added after the field count check;
/// 4- or 6-field inputs never reach the parser.
pub fn parse_cron(expr: &str) -> Result<Schedule, CronError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(CronError::FieldCount(fields));
    }

    format!("0 {}", expr.trim())
        .parse::<Schedule>()
        .map_err(|error| CronError::Parse(error.to_string()))
}

fn job_id(skill_name: &str) -> String {
    format!("skill-{skill_name}")
}

impl SkillScheduler {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry, jobs: RwLock::new(HashMap::new()), callback: RwLock::new(None) }
    }

    pub async fn set_callback(&self, callback: Arc<dyn SkillTrigger>) {
        *self.callback.write().await = Some(callback);
    }

    /// Drops every job and re-registers one per currently loaded scheduled
    /// skill. Malformed cron expressions are logged and skipped. Returns the
    /// number of jobs registered.
    pub async fn register_all(&self) -> usize {
        let scheduled: Vec<SkillConfig> = {
            let registry = self.registry.read().await;
            registry.scheduled_skills().into_iter().cloned().collect()
        };

        let mut jobs = self.jobs.write().await;
        jobs.clear();
        for skill in &scheduled {
            if let Err(reason) = add_job(&mut jobs, skill) {
                warn!(skill = %skill.name, reason = %reason, "skipping unschedulable skill");
            }
        }

        info!(jobs = jobs.len(), "scheduler registered skills");
        jobs.len()
    }

    /// Registers or replaces the job for a single skill without a restart.
    /// A no-op for skills that are not scheduled or have no cron expression.
    /// Returns whether a job exists for the skill afterwards.
    pub async fn add_or_update_job(&self, skill: &SkillConfig) -> bool {
        if skill.trigger != Trigger::Scheduled {
            return false;
        }
        let has_schedule =
            skill.schedule.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        if !has_schedule {
            return false;
        }

        let mut jobs = self.jobs.write().await;
        match add_job(&mut jobs, skill) {
            Ok(()) => {
                info!(skill = %skill.name, "scheduled skill registered");
                true
            }
            Err(reason) => {
                warn!(skill = %skill.name, reason = %reason, "could not schedule skill");
                false
            }
        }
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn has_job(&self, skill_name: &str) -> bool {
        self.jobs.read().await.contains_key(&job_id(skill_name))
    }

    /// Fires every job due at `now` and advances its next-fire time.
    /// Definitions are looked up fresh at fire time; a skill deleted since
    /// registration logs and does nothing. Returns the fired skill names.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut due: Vec<String> = Vec::new();
        {
            let mut jobs = self.jobs.write().await;
            for job in jobs.values_mut() {
                if job.next_fire > now {
                    continue;
                }
                due.push(job.skill_name.clone());
                if let Some(next) = job.schedule.after(&now).next() {
                    job.next_fire = next;
                }
            }
        }

        let mut fired = Vec::with_capacity(due.len());
        for skill_name in due {
            let skill = {
                let registry = self.registry.read().await;
                registry.get(&skill_name).cloned()
            };
            let Some(skill) = skill else {
                error!(skill = %skill_name, "scheduled skill no longer exists");
                continue;
            };

            let callback = self.callback.read().await.clone();
            let Some(callback) = callback else {
                warn!(skill = %skill_name, "no trigger callback registered");
                continue;
            };

            info!(skill = %skill_name, "cron fired");
            callback.fire(skill).await;
            fired.push(skill_name);
        }
        fired
    }

    /// Timer loop; runs until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            self.fire_due(Utc::now()).await;
        }
    }
}

fn add_job(jobs: &mut HashMap<String, ScheduledJob>, skill: &SkillConfig) -> Result<(), String> {
    let expr = skill.schedule.as_deref().unwrap_or_default();
    let schedule = parse_cron(expr).map_err(|error| error.to_string())?;
    let next_fire = schedule
        .upcoming(Utc)
        .next()
        .ok_or_else(|| "schedule never fires".to_string())?;

    jobs.insert(
        job_id(&skill.name),
        ScheduledJob { skill_name: skill.name.clone(), schedule, next_fire },
    );
    Ok(())
}
