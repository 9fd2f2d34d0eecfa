use serde_json::Value;

use super::LaunchSpec;
use crate::batch::TaskSpec;
use crate::config::BackendOverrides;

/// Claude keeps permission prompts on unless the caller opted out, reads
/// auxiliary model/env settings from the user's settings file, and receives
/// connection overrides through the standard Anthropic variables.
pub(super) fn assemble(
    task: &TaskSpec,
    overrides: Option<&BackendOverrides>,
    skip_permissions: Option<bool>,
) -> LaunchSpec {
    let mut args: Vec<String> = vec![
        "-p".into(),
        "--verbose".into(),
        "--output-format".into(),
        "stream-json".into(),
    ];
    let mut env: Vec<(String, String)> = Vec::new();

    let settings = load_user_settings();

    if let Some(model) = task.model.clone().or_else(|| settings_model(&settings)) {
        args.push("--model".into());
        args.push(model);
    }

    if let Some(session) = &task.session_id {
        args.push("--resume".into());
        args.push(session.clone());
    }

    if skip_permissions.unwrap_or(false) {
        args.push("--dangerously-skip-permissions".into());
    }

    if !task.allowed_tools.is_empty() {
        args.push("--allowed-tools".into());
        args.push(task.allowed_tools.join(","));
    }
    if !task.disallowed_tools.is_empty() {
        args.push("--disallowed-tools".into());
        args.push(task.disallowed_tools.join(","));
    }

    // Env block from ~/.claude/settings.json is merged first so explicit
    // overrides below win.
    if let Some(map) = settings
        .as_ref()
        .and_then(|s| s.get("env"))
        .and_then(Value::as_object)
    {
        for (k, v) in map {
            if let Some(v) = v.as_str() {
                env.push((k.clone(), v.to_string()));
            }
        }
    }

    if let Some(ovr) = overrides {
        if let Some(url) = &ovr.base_url {
            env.push(("ANTHROPIC_BASE_URL".into(), url.clone()));
        }
        if let Some(key) = &ovr.api_key {
            env.push(("ANTHROPIC_API_KEY".into(), key.clone()));
        }
    }

    LaunchSpec {
        program: "claude".to_string(),
        args,
        env,
        prompt_in_argv: false,
    }
}

fn load_user_settings() -> Option<Value> {
    let path = crate::util::home_dir()?.join(".claude").join("settings.json");
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(error.message = %e, "ignoring unparsable claude settings file");
            None
        }
    }
}

fn settings_model(settings: &Option<Value>) -> Option<String> {
    settings
        .as_ref()?
        .get("model")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_prompts_stay_on_by_default() {
        let task = TaskSpec::new("t", "p");
        let spec = assemble(&task, None, None);
        assert!(!spec
            .args
            .iter()
            .any(|a| a == "--dangerously-skip-permissions"));

        let spec = assemble(&task, None, Some(true));
        assert!(spec
            .args
            .iter()
            .any(|a| a == "--dangerously-skip-permissions"));
    }

    #[test]
    fn connection_overrides_become_anthropic_env() {
        let task = TaskSpec::new("t", "p");
        let ovr = BackendOverrides {
            base_url: Some("https://proxy.internal".into()),
            api_key: Some("sk-test".into()),
            env: Default::default(),
        };
        let spec = assemble(&task, Some(&ovr), None);
        assert!(spec
            .env
            .iter()
            .any(|(k, v)| k == "ANTHROPIC_BASE_URL" && v == "https://proxy.internal"));
        assert!(spec
            .env
            .iter()
            .any(|(k, v)| k == "ANTHROPIC_API_KEY" && v == "sk-test"));
    }

    #[test]
    fn tool_lists_are_forwarded_comma_joined() {
        let mut task = TaskSpec::new("t", "p");
        task.allowed_tools = vec!["Bash".into(), "Edit".into()];
        task.disallowed_tools = vec!["WebSearch".into()];
        let spec = assemble(&task, None, None);
        let a = spec.args.iter().position(|x| x == "--allowed-tools").unwrap();
        assert_eq!(spec.args[a + 1], "Bash,Edit");
        let d = spec
            .args
            .iter()
            .position(|x| x == "--disallowed-tools")
            .unwrap();
        assert_eq!(spec.args[d + 1], "WebSearch");
    }

    #[test]
    fn resume_flag_carries_session_id() {
        let mut task = TaskSpec::new("t", "p");
        task.session_id = Some("abc".into());
        let spec = assemble(&task, None, None);
        let r = spec.args.iter().position(|x| x == "--resume").unwrap();
        assert_eq!(spec.args[r + 1], "abc");
    }
}
