use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::skill::{SkillConfig, Trigger};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not read skills directory `{path}`: {source}")]
    ReadDir { path: PathBuf, source: std::io::Error },
    #[error("could not write skill file `{path}`: {source}")]
    WriteFile { path: PathBuf, source: std::io::Error },
    #[error("could not serialize skill `{name}`: {source}")]
    Serialize { name: String, source: serde_yaml::Error },
    #[error("invalid skill definition: {0}")]
    Invalid(String),
}

/// In-memory index of skill definitions backed by a directory of YAML files.
///
/// Malformed files are logged and skipped so one bad skill never takes the
/// whole agent down.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills_dir: PathBuf,
    skills: HashMap<String, SkillConfig>,
}

impl SkillRegistry {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        Self { skills_dir: skills_dir.into(), skills: HashMap::new() }
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    /// Loads every `.yaml`/`.yml` file from the skills directory, replacing
    /// any previously loaded definitions. Returns the number of skills loaded.
    pub fn load_all(&mut self) -> Result<usize, RegistryError> {
        self.skills.clear();

        if !self.skills_dir.exists() {
            warn!(dir = %self.skills_dir.display(), "skills directory does not exist");
            return Ok(0);
        }

        let entries = fs::read_dir(&self.skills_dir).map_err(|source| {
            RegistryError::ReadDir { path: self.skills_dir.clone(), source }
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(error = %error, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            match load_skill_file(&path) {
                Ok(skill) => {
                    info!(skill = %skill.name, path = %path.display(), "loaded skill");
                    self.skills.insert(skill.name.clone(), skill);
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping invalid skill file");
                }
            }
        }

        Ok(self.skills.len())
    }

    /// Registers a skill in memory without writing it to disk.
    pub fn insert(&mut self, skill: SkillConfig) {
        self.skills.insert(skill.name.clone(), skill);
    }

    pub fn get(&self, name: &str) -> Option<&SkillConfig> {
        self.skills.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &SkillConfig> {
        self.skills.values()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Skills the scheduler should register: scheduled trigger with a
    /// non-empty cron expression.
    pub fn scheduled_skills(&self) -> Vec<&SkillConfig> {
        let mut skills: Vec<_> = self
            .skills
            .values()
            .filter(|skill| {
                skill.trigger == Trigger::Scheduled
                    && skill.schedule.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
            })
            .collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    /// Mention-triggered skills bound to any of the given channel
    /// references, deduplicated by name. A `#name` binding matches a bare
    /// `name` reference and vice versa.
    pub fn mention_skills_for(&self, channel_refs: &[&str]) -> Vec<&SkillConfig> {
        let refs: Vec<&str> = channel_refs.iter().map(|r| r.trim_start_matches('#')).collect();
        let mut seen: Vec<&str> = Vec::new();
        let mut matched: Vec<&SkillConfig> = Vec::new();

        for skill in self.skills.values() {
            if skill.trigger != Trigger::Mention {
                continue;
            }
            let Some(channel) = skill.channel.as_deref() else {
                continue;
            };
            let channel = channel.trim_start_matches('#');
            if refs.contains(&channel) && !seen.contains(&skill.name.as_str()) {
                seen.push(&skill.name);
                matched.push(skill);
            }
        }

        matched.sort_by(|a, b| a.name.cmp(&b.name));
        matched
    }

    /// Finds a skill by loose name match: exact first, then a
    /// whitespace/hyphen-insensitive substring match.
    pub fn resolve_name(&self, phrase: &str) -> Option<&SkillConfig> {
        if let Some(skill) = self.skills.get(phrase) {
            return Some(skill);
        }

        let compact_phrase = compact(phrase);
        let mut candidates: Vec<_> = self
            .skills
            .values()
            .filter(|skill| {
                let compact_name = compact(&skill.name);
                compact_phrase.contains(&compact_name) || compact_name.contains(&compact_phrase)
            })
            .collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        candidates.into_iter().next()
    }

    /// Persists a skill definition to disk and registers it in memory.
    /// The file name is the kebab-cased skill name.
    pub fn save_skill(&mut self, skill: SkillConfig) -> Result<PathBuf, RegistryError> {
        skill.validate().map_err(RegistryError::Invalid)?;

        fs::create_dir_all(&self.skills_dir).map_err(|source| RegistryError::WriteFile {
            path: self.skills_dir.clone(),
            source,
        })?;

        let file_name = format!("{}.yaml", kebab_case(&skill.name));
        let path = self.skills_dir.join(file_name);
        let yaml = serde_yaml::to_string(&skill).map_err(|source| RegistryError::Serialize {
            name: skill.name.clone(),
            source,
        })?;

        fs::write(&path, yaml)
            .map_err(|source| RegistryError::WriteFile { path: path.clone(), source })?;

        info!(skill = %skill.name, path = %path.display(), "saved skill");
        self.skills.insert(skill.name.clone(), skill);
        Ok(path)
    }
}

fn load_skill_file(path: &Path) -> Result<SkillConfig, String> {
    let raw = fs::read_to_string(path).map_err(|error| error.to_string())?;
    let skill: SkillConfig = serde_yaml::from_str(&raw).map_err(|error| error.to_string())?;
    skill.validate()?;
    Ok(skill)
}

fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

fn kebab_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_dash = true;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::SkillRegistry;
    use crate::skill::{SkillConfig, Trigger};

    fn write_skill(dir: &TempDir, file: &str, contents: &str) {
        fs::write(dir.path().join(file), contents).unwrap();
    }

    #[test]
    fn loads_valid_skills_and_skips_broken_files() {
        let dir = TempDir::new().unwrap();
        write_skill(
            &dir,
            "standup.yaml",
            "name: standup\ntrigger: scheduled\nschedule: \"0 9 * * 1-5\"\n",
        );
        write_skill(&dir, "triage.yml", "name: triage\ntrigger: mention\nchannel: \"C1\"\n");
        write_skill(&dir, "broken.yaml", "name: [unclosed\n");
        write_skill(&dir, "notes.txt", "not a skill");

        let mut registry = SkillRegistry::new(dir.path());
        let loaded = registry.load_all().unwrap();

        assert_eq!(loaded, 2);
        assert!(registry.get("standup").is_some());
        assert!(registry.get("triage").is_some());
    }

    #[test]
    fn missing_directory_loads_zero_skills() {
        let dir = TempDir::new().unwrap();
        let mut registry = SkillRegistry::new(dir.path().join("does-not-exist"));

        assert_eq!(registry.load_all().unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn scheduled_skills_require_a_schedule() {
        let mut registry = SkillRegistry::new("unused");
        let mut scheduled = SkillConfig::new("daily", Trigger::Scheduled);
        scheduled.schedule = Some("0 9 * * *".to_string());
        registry.insert(scheduled);
        registry.insert(SkillConfig::new("adhoc", Trigger::Mention));

        let scheduled = registry.scheduled_skills();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].name, "daily");
    }

    #[test]
    fn mention_skills_match_channel_refs_without_duplicates() {
        let mut registry = SkillRegistry::new("unused");
        let mut triage = SkillConfig::new("triage", Trigger::Mention);
        triage.channel = Some("C1".to_string());
        let mut other = SkillConfig::new("other", Trigger::Mention);
        other.channel = Some("C2".to_string());
        let mut scheduled = SkillConfig::new("daily", Trigger::Scheduled);
        scheduled.channel = Some("C1".to_string());
        scheduled.schedule = Some("0 9 * * *".to_string());
        for skill in [triage, other, scheduled] {
            registry.insert(skill);
        }

        let matched = registry.mention_skills_for(&["C1", "#triage"]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "triage");
    }

    #[test]
    fn channel_binding_normalizes_hash_prefix() {
        let mut registry = SkillRegistry::new("unused");
        let mut helper = SkillConfig::new("helper", Trigger::Mention);
        helper.channel = Some("#help".to_string());
        registry.insert(helper);

        assert_eq!(registry.mention_skills_for(&["help"]).len(), 1);
        assert_eq!(registry.mention_skills_for(&["#help"]).len(), 1);
        assert!(registry.mention_skills_for(&["other"]).is_empty());
    }

    #[test]
    fn resolve_name_tolerates_spacing_and_hyphens() {
        let mut registry = SkillRegistry::new("unused");
        registry.insert(SkillConfig::new("morning-standup", Trigger::Mention));

        assert!(registry.resolve_name("morning standup").is_some());
        assert!(registry.resolve_name("the morning standup checkin").is_some());
        assert!(registry.resolve_name("retro").is_none());
    }

    #[test]
    fn save_skill_writes_kebab_cased_yaml_and_registers() {
        let dir = TempDir::new().unwrap();
        let mut registry = SkillRegistry::new(dir.path());

        let mut skill = SkillConfig::new("Weekly Retro", Trigger::Scheduled);
        skill.schedule = Some("0 16 * * 5".to_string());
        let path = registry.save_skill(skill).unwrap();

        assert!(path.ends_with("weekly-retro.yaml"));
        assert!(path.exists());
        assert!(registry.get("Weekly Retro").is_some());

        registry.load_all().unwrap();
        assert!(registry.get("Weekly Retro").is_some());
    }

    #[test]
    fn save_skill_rejects_invalid_definitions() {
        let dir = TempDir::new().unwrap();
        let mut registry = SkillRegistry::new(dir.path());

        let invalid = SkillConfig::new("nightly", Trigger::Scheduled);
        assert!(registry.save_skill(invalid).is_err());
    }
}
