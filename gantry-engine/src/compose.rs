//! Script composer
//!
//! Renders a pipeline's ordered steps into one shell script. Each step's
//! module body has its `{{NAME}}` placeholders substituted from the step's
//! parameters plus computed ambient values; every value is validated before
//! any replacement happens, and composition aborts entirely on the first
//! violation. Same pipeline snapshot and module contents always produce the
//! same script.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use gantry_core::domain::pipeline::Pipeline;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::store::ModuleSource;

static REPO_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._/-]+$").unwrap());
static BRANCH_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9/_.-]+$").unwrap());
static PIPELINE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());
static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9.-]+$").unwrap());

/// Shell metacharacters rejected in every substituted value
const INJECTION_CHARS: &[char] = &[';', '&', '|', '`', '$'];

/// Composes the full deployment script for a pipeline snapshot
pub async fn compose_script(
    pipeline: &Pipeline,
    modules: &dyn ModuleSource,
    config: &EngineConfig,
) -> Result<String, EngineError> {
    if pipeline.steps.is_empty() {
        return Err(EngineError::Validation {
            field: "steps",
            value: "(no steps defined)".to_string(),
        });
    }

    ensure_allowed("repo", &pipeline.repo, &REPO_PATTERN)?;
    ensure_allowed("branch", &pipeline.branch, &BRANCH_PATTERN)?;
    ensure_allowed("pipeline_id", &pipeline.id, &PIPELINE_ID_PATTERN)?;
    ensure_allowed("domain", &config.domain, &DOMAIN_PATTERN)?;

    let repo_url = format!("git@github.com:{}.git", pipeline.repo);

    let mut script = String::from("#!/bin/bash\nset -e\n");

    for (index, step) in pipeline.steps.iter().enumerate() {
        let module = modules
            .get_module(&step.module_id)
            .await?
            .ok_or_else(|| EngineError::TemplateNotFound {
                step: index + 1,
                module: step.module_id.clone(),
            })?;

        // Ambient values win over step parameters of the same name
        let mut substitutions: BTreeMap<String, String> = step
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        substitutions.insert("REPO_URL".to_string(), repo_url.clone());
        substitutions.insert("BRANCH".to_string(), pipeline.branch.clone());
        substitutions.insert("PIPELINE_ID".to_string(), pipeline.id.clone());
        substitutions.insert("DOMAIN".to_string(), config.domain.clone());

        for (key, value) in &substitutions {
            scan_for_injection(key, value)?;
        }

        let mut body = module.body.clone();
        for (key, value) in &substitutions {
            body = body.replace(&format!("{{{{{key}}}}}"), value);
        }

        script.push_str(&format!("\n# --- STEP {}: {} ---\n", index + 1, module.name));
        script.push_str(&body);
        script.push('\n');
    }

    Ok(script)
}

fn ensure_allowed(
    field: &'static str,
    value: &str,
    pattern: &Regex,
) -> Result<(), EngineError> {
    if pattern.is_match(value) {
        Ok(())
    } else {
        Err(EngineError::Validation {
            field,
            value: value.to_string(),
        })
    }
}

fn scan_for_injection(param: &str, value: &str) -> Result<(), EngineError> {
    if value.contains(INJECTION_CHARS) {
        return Err(EngineError::InjectionSuspected {
            param: param.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gantry_core::domain::module::Module;
    use gantry_core::domain::pipeline::{ExecTarget, Step};
    use std::collections::HashMap;

    struct StaticModules(HashMap<String, Module>);

    impl StaticModules {
        fn with(modules: Vec<Module>) -> Self {
            Self(modules.into_iter().map(|m| (m.id.clone(), m)).collect())
        }
    }

    #[async_trait]
    impl ModuleSource for StaticModules {
        async fn get_module(&self, id: &str) -> anyhow::Result<Option<Module>> {
            Ok(self.0.get(id).cloned())
        }
    }

    fn module(id: &str, name: &str, body: &str, params: &[&str]) -> Module {
        Module {
            id: id.to_string(),
            name: name.to_string(),
            body: body.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn pipeline(steps: Vec<Step>) -> Pipeline {
        Pipeline {
            id: "test-app".to_string(),
            name: "Test App".to_string(),
            repo: "user/repo".to_string(),
            branch: "main".to_string(),
            workdir: "/tmp".to_string(),
            webhook_secret: None,
            target: ExecTarget::Local,
            steps,
        }
    }

    fn step(module_id: &str, params: &[(&str, &str)]) -> Step {
        Step {
            module_id: module_id.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_substitutes_step_params() {
        let modules = StaticModules::with(vec![module("echo", "Echo", "echo {{MSG}}", &["MSG"])]);
        let p = pipeline(vec![step("echo", &[("MSG", "hello world")])]);

        let script = compose_script(&p, &modules, &EngineConfig::default())
            .await
            .unwrap();

        assert!(script.starts_with("#!/bin/bash\nset -e\n"));
        assert!(script.contains("echo hello world"));
    }

    #[tokio::test]
    async fn test_step_banners_in_order() {
        let modules = StaticModules::with(vec![
            module("a", "First", "echo a", &[]),
            module("b", "Second", "echo b", &[]),
            module("c", "Third", "echo c", &[]),
        ]);
        let p = pipeline(vec![step("a", &[]), step("b", &[]), step("c", &[])]);

        let script = compose_script(&p, &modules, &EngineConfig::default())
            .await
            .unwrap();

        let first = script.find("# --- STEP 1: First ---").unwrap();
        let second = script.find("# --- STEP 2: Second ---").unwrap();
        let third = script.find("# --- STEP 3: Third ---").unwrap();
        assert!(first < second && second < third);
        assert!(script[first..second].contains("echo a"));
        assert!(script[second..third].contains("echo b"));
        assert!(script[third..].contains("echo c"));
    }

    #[tokio::test]
    async fn test_ambient_values_rendered() {
        let modules = StaticModules::with(vec![module(
            "clone",
            "Clone",
            "git clone -b {{BRANCH}} {{REPO_URL}} . # {{PIPELINE_ID}} {{DOMAIN}}",
            &[],
        )]);
        let p = pipeline(vec![step("clone", &[])]);

        let script = compose_script(&p, &modules, &EngineConfig::default())
            .await
            .unwrap();

        assert!(script.contains("git clone -b main git@github.com:user/repo.git ."));
        assert!(script.contains("test-app localhost"));
    }

    #[tokio::test]
    async fn test_ambient_wins_over_step_param() {
        let modules = StaticModules::with(vec![module("m", "M", "echo {{BRANCH}}", &["BRANCH"])]);
        let p = pipeline(vec![step("m", &[("BRANCH", "spoofed")])]);

        let script = compose_script(&p, &modules, &EngineConfig::default())
            .await
            .unwrap();

        assert!(script.contains("echo main"));
        assert!(!script.contains("spoofed"));
    }

    #[tokio::test]
    async fn test_injection_in_param_rejected() {
        let modules = StaticModules::with(vec![module(
            "run",
            "Run",
            "{{SCRIPT_CONTENT}}",
            &["SCRIPT_CONTENT"],
        )]);

        for payload in [
            "echo hi; rm -rf /",
            "a && b",
            "a | b",
            "`id`",
            "$(id)",
        ] {
            let p = pipeline(vec![step("run", &[("SCRIPT_CONTENT", payload)])]);
            let err = compose_script(&p, &modules, &EngineConfig::default())
                .await
                .unwrap_err();
            match err {
                EngineError::InjectionSuspected { param } => {
                    assert_eq!(param, "SCRIPT_CONTENT");
                }
                other => panic!("expected InjectionSuspected, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_branch_rejected() {
        let modules = StaticModules::with(vec![module("m", "M", "echo ok", &[])]);
        let mut p = pipeline(vec![step("m", &[])]);
        p.branch = "main branch".to_string();

        let err = compose_script(&p, &modules, &EngineConfig::default())
            .await
            .unwrap_err();
        match err {
            EngineError::Validation { field, .. } => assert_eq!(field, "branch"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_module_names_step() {
        let modules = StaticModules::with(vec![module("known", "Known", "echo ok", &[])]);
        let p = pipeline(vec![step("known", &[]), step("ghost", &[])]);

        let err = compose_script(&p, &modules, &EngineConfig::default())
            .await
            .unwrap_err();
        match err {
            EngineError::TemplateNotFound { step, module } => {
                assert_eq!(step, 2);
                assert_eq!(module, "ghost");
            }
            other => panic!("expected TemplateNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_steps_rejected() {
        let modules = StaticModules::with(vec![]);
        let p = pipeline(vec![]);

        assert!(matches!(
            compose_script(&p, &modules, &EngineConfig::default()).await,
            Err(EngineError::Validation { field: "steps", .. })
        ));
    }

    #[tokio::test]
    async fn test_composition_is_deterministic() {
        let modules = StaticModules::with(vec![module(
            "m",
            "M",
            "echo {{A}} {{B}} {{C}}",
            &["A", "B", "C"],
        )]);
        let p = pipeline(vec![step("m", &[("A", "1"), ("B", "2"), ("C", "3")])]);

        let once = compose_script(&p, &modules, &EngineConfig::default())
            .await
            .unwrap();
        let twice = compose_script(&p, &modules, &EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(once, twice);
    }
}
