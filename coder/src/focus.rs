//! Known projects and the current focus.
//!
//! The focus is one atomically replaceable reference: readers get an
//! `Arc` snapshot, writers swap the whole pointer. Nothing hands out a
//! mutable handle to the focused project.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::types::SoftwareProject;
use crate::io::config::{CoderConfig, ProjectConfig, load_config, write_config};
use crate::io::focus_store::{FocusState, load_focus, save_focus};

/// Projects known to this installation, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectRepository {
    projects: Vec<SoftwareProject>,
}

impl ProjectRepository {
    pub fn new(projects: Vec<SoftwareProject>) -> Self {
        Self { projects }
    }

    pub fn from_config(cfg: &CoderConfig) -> Self {
        Self::new(cfg.known_projects())
    }

    pub fn projects(&self) -> &[SoftwareProject] {
        &self.projects
    }

    /// First project whose root contains `needle`. Blank needles match nothing.
    pub fn find_by_substring(&self, needle: &str) -> Option<&SoftwareProject> {
        let needle = needle.trim();
        if needle.is_empty() {
            return None;
        }
        self.projects
            .iter()
            .find(|project| project.root.to_string_lossy().contains(needle))
    }

    pub fn find_by_root(&self, root: &Path) -> Option<&SoftwareProject> {
        self.projects.iter().find(|project| project.root == root)
    }

    /// Add or replace the project with the same root.
    pub fn save(&mut self, project: SoftwareProject) {
        match self.projects.iter_mut().find(|p| p.root == project.root) {
            Some(existing) => *existing = project,
            None => self.projects.push(project),
        }
    }
}

/// Owner of the current focus.
#[derive(Debug, Default)]
pub struct FocusService {
    repository: RwLock<ProjectRepository>,
    current: RwLock<Option<Arc<SoftwareProject>>>,
}

impl FocusService {
    pub fn new(repository: ProjectRepository) -> Self {
        Self {
            repository: RwLock::new(repository),
            current: RwLock::new(None),
        }
    }

    /// Snapshot of the focused project.
    pub fn current(&self) -> Option<Arc<SoftwareProject>> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Focus the first known project whose root contains `needle`.
    ///
    /// Returns the new focus, or `None` (focus unchanged) when nothing matches.
    pub fn set_focus(&self, needle: &str) -> Option<Arc<SoftwareProject>> {
        let found = self
            .repository
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .find_by_substring(needle)
            .cloned()?;
        let project = Arc::new(found);
        self.replace(Arc::clone(&project));
        info!(root = %project.root.display(), "focus switched");
        Some(project)
    }

    /// Focus a project the repository already holds, by exact root.
    pub fn switch_to(&self, root: &Path) -> Option<Arc<SoftwareProject>> {
        let found = self
            .repository
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .find_by_root(root)
            .cloned()?;
        let project = Arc::new(found);
        self.replace(Arc::clone(&project));
        Some(project)
    }

    /// Register a project and focus it.
    ///
    /// A root the repository did not hold yet is marked `was_created`, so the
    /// first cycle on it sees a build as needed.
    pub fn save_and_switch(&self, mut project: SoftwareProject) -> Arc<SoftwareProject> {
        {
            let mut repository = self
                .repository
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            project.was_created = repository.find_by_root(&project.root).is_none();
            repository.save(project.clone());
        }
        let project = Arc::new(project);
        self.replace(Arc::clone(&project));
        info!(root = %project.root.display(), "project saved and focused");
        project
    }

    pub fn repository(&self) -> ProjectRepository {
        self.repository
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, project: Arc<SoftwareProject>) {
        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(project);
    }
}

/// Focus service backed by a config file and its focus state file.
#[derive(Debug)]
pub struct FocusSession {
    config_path: PathBuf,
    focus_path: PathBuf,
    config: CoderConfig,
    service: FocusService,
}

impl FocusSession {
    /// Load config and restore the saved focus (or `default_project`).
    pub fn open(config_path: &Path) -> Result<Self> {
        let config = load_config(config_path)?;
        let focus_path = crate::io::config::focus_state_path(config_path);
        let service = FocusService::new(ProjectRepository::from_config(&config));

        let saved = load_focus(&focus_path)?;
        let restored = saved.root.as_deref().and_then(|root| service.switch_to(root));
        if restored.is_none() {
            if let Some(default) = config.default_project.as_deref() {
                service.set_focus(default);
            }
        }
        debug!(focus = ?service.current().map(|p| p.root_display()), "focus session opened");
        Ok(Self {
            config_path: config_path.to_path_buf(),
            focus_path,
            config,
            service,
        })
    }

    pub fn config(&self) -> &CoderConfig {
        &self.config
    }

    pub fn current(&self) -> Option<Arc<SoftwareProject>> {
        self.service.current()
    }

    /// Switch focus by substring and persist it. `None` when nothing matches.
    pub fn set_focus(&self, needle: &str) -> Result<Option<Arc<SoftwareProject>>> {
        let Some(project) = self.service.set_focus(needle) else {
            return Ok(None);
        };
        self.persist_focus(&project)?;
        Ok(Some(project))
    }

    /// Register a project in the config file and focus it.
    pub fn save_and_switch(&mut self, project: SoftwareProject) -> Result<Arc<SoftwareProject>> {
        let entry = ProjectConfig {
            root: project.root.clone(),
            build_command: project.build_command.clone(),
            tech: project.tech.clone(),
            coding_style: project.coding_style.clone(),
        };
        match self.config.projects.iter_mut().find(|p| p.root == entry.root) {
            Some(existing) => *existing = entry,
            None => self.config.projects.push(entry),
        }
        write_config(&self.config_path, &self.config)
            .with_context(|| format!("register project {}", project.root.display()))?;
        let focused = self.service.save_and_switch(project);
        self.persist_focus(&focused)?;
        Ok(focused)
    }

    fn persist_focus(&self, project: &SoftwareProject) -> Result<()> {
        save_focus(
            &self.focus_path,
            &FocusState {
                root: Some(project.root.clone()),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn repository() -> ProjectRepository {
        ProjectRepository::new(vec![
            SoftwareProject::new("/work/spring-petclinic"),
            SoftwareProject::new("/work/inventory-api"),
        ])
    }

    #[test]
    fn set_focus_matches_substring() {
        let service = FocusService::new(repository());
        assert!(service.current().is_none());
        let focused = service.set_focus("petclinic").expect("match");
        assert_eq!(focused.root, PathBuf::from("/work/spring-petclinic"));
        assert_eq!(service.current().expect("focus").root, focused.root);
    }

    #[test]
    fn unknown_target_leaves_focus_unchanged() {
        let service = FocusService::new(repository());
        service.set_focus("inventory").expect("match");
        assert!(service.set_focus("nonexistent").is_none());
        assert!(service.set_focus("   ").is_none());
        assert_eq!(
            service.current().expect("focus").root,
            PathBuf::from("/work/inventory-api")
        );
    }

    #[test]
    fn snapshots_survive_later_switches() {
        let service = FocusService::new(repository());
        service.set_focus("petclinic").expect("match");
        let snapshot = service.current().expect("focus");
        service.set_focus("inventory").expect("match");
        assert_eq!(snapshot.root, PathBuf::from("/work/spring-petclinic"));
    }

    #[test]
    fn save_and_switch_registers_project() {
        let service = FocusService::new(repository());
        let created = SoftwareProject::new("/work/new-service").with_build_command("make");
        service.save_and_switch(created.clone());
        let focused = service.current().expect("focus");
        assert_eq!(focused.root, created.root);
        assert!(focused.was_created);
        assert!(service.repository().find_by_substring("new-service").is_some());
    }

    #[test]
    fn saving_a_known_project_is_not_a_creation() {
        let service = FocusService::new(repository());
        let known = SoftwareProject::new("/work/inventory-api").with_build_command("make");
        let focused = service.save_and_switch(known);
        assert!(!focused.was_created);
        assert_eq!(focused.build_command.as_deref(), Some("make"));
    }

    #[test]
    fn switch_to_focuses_known_root_without_touching_repository() {
        let service = FocusService::new(repository());
        let before = service.repository();
        let focused = service
            .switch_to(Path::new("/work/inventory-api"))
            .expect("known root");
        assert!(!focused.was_created);
        assert_eq!(service.repository(), before);
        assert!(service.switch_to(Path::new("/work/unknown")).is_none());
        assert_eq!(
            service.current().expect("focus").root,
            PathBuf::from("/work/inventory-api")
        );
    }

    #[test]
    fn concurrent_switches_always_leave_a_known_project() {
        let service = Arc::new(FocusService::new(repository()));
        let handles: Vec<_> = ["petclinic", "inventory"]
            .iter()
            .map(|needle| {
                let service = Arc::clone(&service);
                let needle = (*needle).to_string();
                thread::spawn(move || {
                    for _ in 0..100 {
                        service.set_focus(&needle).expect("match");
                        assert!(service.current().is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        let root = service.current().expect("focus").root.clone();
        assert!(service.repository().find_by_root(&root).is_some());
    }

    #[test]
    fn session_persists_focus_across_opens() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("coder.toml");
        let cfg = CoderConfig {
            projects: vec![
                ProjectConfig {
                    root: PathBuf::from("/work/spring-petclinic"),
                    build_command: None,
                    tech: String::new(),
                    coding_style: None,
                },
                ProjectConfig {
                    root: PathBuf::from("/work/inventory-api"),
                    build_command: None,
                    tech: String::new(),
                    coding_style: None,
                },
            ],
            default_project: Some("petclinic".to_string()),
            ..CoderConfig::default()
        };
        write_config(&config_path, &cfg).expect("write config");

        let session = FocusSession::open(&config_path).expect("open");
        assert_eq!(
            session.current().expect("default focus").root,
            PathBuf::from("/work/spring-petclinic")
        );
        session.set_focus("inventory").expect("set").expect("match");

        let reopened = FocusSession::open(&config_path).expect("reopen");
        assert_eq!(
            reopened.current().expect("saved focus").root,
            PathBuf::from("/work/inventory-api")
        );
    }

    #[test]
    fn session_save_and_switch_writes_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("coder.toml");
        let mut session = FocusSession::open(&config_path).expect("open");
        assert!(session.current().is_none());
        session
            .save_and_switch(SoftwareProject::new("/work/fresh").with_build_command("make"))
            .expect("save");

        let reloaded = load_config(&config_path).expect("load");
        assert_eq!(reloaded.projects.len(), 1);
        assert_eq!(reloaded.projects[0].build_command.as_deref(), Some("make"));
        let reopened = FocusSession::open(&config_path).expect("reopen");
        assert_eq!(
            reopened.current().expect("focus").root,
            PathBuf::from("/work/fresh")
        );
    }
}
