//! End-to-end pipeline scenarios against the public API.

use std::sync::Arc;

use async_trait::async_trait;

use buildenv_core::{
    BuildContext, Contributor, EnvStore, InjectError, InjectionConfig, JsonEnvStore,
    MemoryEnvStore, Pipeline, ScriptOutput, ScriptRunner, ScriptSpec, SecretEntry, StaticSecrets,
    TriggerKind, VarMap, varmap,
};

fn quiet_config() -> InjectionConfig {
    InjectionConfig {
        keep_system_vars: false,
        populate_trigger_vars: false,
        ..Default::default()
    }
}

/// Script runner double returning a fixed outcome without spawning anything.
struct FakeRunner {
    exit_code: i32,
    vars: VarMap,
}

#[async_trait]
impl ScriptRunner for FakeRunner {
    async fn run(&self, _spec: &ScriptSpec, _env: &VarMap) -> Result<ScriptOutput, InjectError> {
        Ok(ScriptOutput {
            exit_code: self.exit_code,
            vars: self.vars.clone(),
        })
    }
}

struct FixedContributor {
    name: &'static str,
    vars: VarMap,
}

#[async_trait]
impl Contributor for FixedContributor {
    fn name(&self) -> &str {
        self.name
    }

    async fn env_vars(&self, _ctx: &BuildContext) -> Result<VarMap, InjectError> {
        Ok(self.vars.clone())
    }
}

#[tokio::test]
async fn script_vars_override_build_params() {
    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        script: Some(ScriptSpec::inline("unused")),
        ..quiet_config()
    };

    let pipeline = Pipeline::new(config, store).with_script_runner(Arc::new(FakeRunner {
        exit_code: 0,
        vars: varmap([("STAGE", "from-script")]),
    }));

    let ctx = BuildContext::new("b1").with_params(varmap([("STAGE", "from-params")]));
    let outcome = pipeline.run(&ctx).await.unwrap();

    assert_eq!(
        outcome.injected().unwrap().get("STAGE").unwrap(),
        "from-script"
    );
}

#[tokio::test]
async fn failing_script_fails_build_and_persists_nothing() {
    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        script: Some(ScriptSpec::inline("unused")),
        ..quiet_config()
    };

    let pipeline =
        Pipeline::new(config, store.clone()).with_script_runner(Arc::new(FakeRunner {
            exit_code: 2,
            vars: VarMap::new(),
        }));

    let result = pipeline.run(&BuildContext::new("b1")).await;
    assert!(matches!(result, Err(InjectError::ScriptFailed { code: 2 })));
    assert!(store.get("b1").unwrap().is_none());
}

#[tokio::test]
async fn properties_reference_earlier_variables() {
    let dir = tempfile::TempDir::new().unwrap();
    tokio::fs::write(
        dir.path().join("build.properties"),
        "DEPLOY_DIR=${WORKSPACE}/deploy\nVERSION=2.0\n",
    )
    .await
    .unwrap();

    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        properties_files: vec!["${WORKSPACE}/build.properties".into()],
        ..quiet_config()
    };

    let pipeline = Pipeline::new(config, store);
    let ctx = BuildContext::new("b1").with_workspace(dir.path());

    let outcome = pipeline.run(&ctx).await.unwrap();
    let vars = outcome.injected().unwrap();

    // The file path was expanded before loading, and the value's own
    // reference resolved in the final pass
    assert_eq!(vars.get("VERSION").unwrap(), "2.0");
    assert_eq!(
        vars.get("DEPLOY_DIR").unwrap(),
        &format!("{}/deploy", dir.path().display())
    );
}

#[tokio::test]
async fn missing_properties_file_fails_the_build() {
    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        properties_files: vec!["/nope/build.properties".into()],
        ..quiet_config()
    };

    let pipeline = Pipeline::new(config, store.clone());
    let result = pipeline.run(&BuildContext::new("b1")).await;

    assert!(matches!(result, Err(InjectError::Properties { .. })));
    assert!(store.get("b1").unwrap().is_none());
}

#[tokio::test]
async fn inline_properties_load_after_files() {
    let dir = tempfile::TempDir::new().unwrap();
    tokio::fs::write(dir.path().join("a.properties"), "SHARED=file\nFILE_ONLY=1\n")
        .await
        .unwrap();

    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        properties_files: vec![dir.path().join("a.properties")],
        properties_content: Some("SHARED=inline".to_string()),
        ..quiet_config()
    };

    let pipeline = Pipeline::new(config, store);
    let outcome = pipeline.run(&BuildContext::new("b1")).await.unwrap();
    let vars = outcome.injected().unwrap();

    assert_eq!(vars.get("SHARED").unwrap(), "inline");
    assert_eq!(vars.get("FILE_ONLY").unwrap(), "1");
}

#[tokio::test]
async fn contributors_run_last_in_registration_order() {
    let store = Arc::new(MemoryEnvStore::new());
    let pipeline = Pipeline::new(quiet_config(), store)
        .with_contributor(Arc::new(FixedContributor {
            name: "toolchain",
            vars: varmap([("CC", "gcc"), ("ORDER", "first")]),
        }))
        .with_contributor(Arc::new(FixedContributor {
            name: "override",
            vars: varmap([("ORDER", "second")]),
        }));

    let ctx = BuildContext::new("b1").with_params(varmap([("CC", "clang")]));
    let outcome = pipeline.run(&ctx).await.unwrap();
    let vars = outcome.injected().unwrap();

    // Contribution origin overrides build parameters; later contributor
    // overrides earlier one
    assert_eq!(vars.get("CC").unwrap(), "gcc");
    assert_eq!(vars.get("ORDER").unwrap(), "second");
}

#[tokio::test]
async fn trigger_facts_are_injected() {
    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        keep_system_vars: false,
        ..Default::default()
    };

    let pipeline = Pipeline::new(config, store);
    let ctx = BuildContext::new("b1").with_triggers(vec![TriggerKind::Scm, TriggerKind::Timer]);

    let outcome = pipeline.run(&ctx).await.unwrap();
    let vars = outcome.injected().unwrap();

    assert_eq!(vars.get("BUILD_CAUSE").unwrap(), "SCMTRIGGER,TIMERTRIGGER");
    assert_eq!(vars.get("BUILD_CAUSE_SCMTRIGGER").unwrap(), "true");
    assert_eq!(vars.get("BUILD_CAUSE_TIMERTRIGGER").unwrap(), "true");
}

#[tokio::test]
async fn cross_source_references_resolve() {
    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        properties_content: Some("ARTIFACT=${APP}-${VERSION}.tar.gz".to_string()),
        script: Some(ScriptSpec::inline("unused")),
        ..quiet_config()
    };

    let pipeline = Pipeline::new(config, store).with_script_runner(Arc::new(FakeRunner {
        exit_code: 0,
        vars: varmap([("VERSION", "3.1.4")]),
    }));

    let ctx = BuildContext::new("b1").with_params(varmap([("APP", "frontend")]));
    let outcome = pipeline.run(&ctx).await.unwrap();

    assert_eq!(
        outcome.injected().unwrap().get("ARTIFACT").unwrap(),
        "frontend-3.1.4.tar.gz"
    );
}

#[tokio::test]
async fn completion_masks_secrets_in_stored_record() {
    let store = Arc::new(MemoryEnvStore::new());
    let pipeline = Pipeline::new(quiet_config(), store.clone());

    let ctx = BuildContext::new("b1").with_params(varmap([("DB_PASS", "plain")]));
    pipeline.run(&ctx).await.unwrap();

    let secrets = StaticSecrets::new(vec![SecretEntry {
        name: "DB_PASS".to_string(),
        masked: "encryptedX".to_string(),
    }]);
    pipeline.complete("b1", &secrets).unwrap();

    let vars = store.get("b1").unwrap().unwrap();
    assert_eq!(vars.get("DB_PASS").unwrap(), "encryptedX");
}

#[tokio::test]
async fn completion_without_record_is_a_noop() {
    let store = Arc::new(MemoryEnvStore::new());
    let pipeline = Pipeline::new(quiet_config(), store.clone());

    let secrets = StaticSecrets::new(vec![SecretEntry {
        name: "DB_PASS".to_string(),
        masked: "encryptedX".to_string(),
    }]);

    pipeline.complete("never-ran", &secrets).unwrap();
    assert!(store.get("never-ran").unwrap().is_none());
}

#[tokio::test]
async fn rerun_replaces_previous_record_entirely() {
    let store = Arc::new(MemoryEnvStore::new());
    let pipeline = Pipeline::new(quiet_config(), store.clone());

    let first = BuildContext::new("b1").with_params(varmap([("ONLY_FIRST", "x")]));
    pipeline.run(&first).await.unwrap();

    let second = BuildContext::new("b1").with_params(varmap([("ONLY_SECOND", "y")]));
    pipeline.run(&second).await.unwrap();

    let vars = store.get("b1").unwrap().unwrap();
    assert!(vars.get("ONLY_FIRST").is_none());
    assert_eq!(vars.get("ONLY_SECOND").unwrap(), "y");
}

#[tokio::test]
async fn json_store_backs_a_full_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(JsonEnvStore::new(dir.path().join("records")));
    let pipeline = Pipeline::new(quiet_config(), store.clone());

    let ctx = BuildContext::new("build-7").with_params(varmap([("A", "1"), ("B", "${A}")]));
    pipeline.run(&ctx).await.unwrap();

    let child = BuildContext::new("build-7-child");
    let outcome = pipeline.run_child(&child, "build-7").await.unwrap();

    assert_eq!(outcome.injected().unwrap().get("B").unwrap(), "1");
    assert_eq!(
        store.get("build-7-child").unwrap().unwrap().get("B").unwrap(),
        "1"
    );
}

#[tokio::test]
#[cfg(unix)]
async fn real_shell_script_end_to_end() {
    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        script: Some(ScriptSpec::inline(
            "echo GIT_SHA=abc123 >> \"$BUILDENV_RESULT\"",
        )),
        ..quiet_config()
    };

    let pipeline = Pipeline::new(config, store);
    let outcome = pipeline.run(&BuildContext::new("b1")).await.unwrap();

    assert_eq!(outcome.injected().unwrap().get("GIT_SHA").unwrap(), "abc123");
}

#[tokio::test]
async fn system_vars_policy_keeps_process_env() {
    let store = Arc::new(MemoryEnvStore::new());
    let config = InjectionConfig {
        populate_trigger_vars: false,
        ..Default::default()
    };

    let pipeline = Pipeline::new(config, store);
    let outcome = pipeline.run(&BuildContext::new("b1")).await.unwrap();
    let vars = outcome.injected().unwrap();

    // Node facts ride along with the process environment
    assert!(vars.get("NODE_NAME").is_some());
    assert!(vars.get("NODE_PLATFORM").is_some());
}
