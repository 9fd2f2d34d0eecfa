use super::LaunchSpec;
use crate::batch::TaskSpec;

/// Codex is the default backend. It always runs with `--skip-git-repo-check`
/// so tasks work outside repositories, and in fresh mode bypasses approvals
/// unless the caller explicitly disabled that.
pub(super) fn assemble(task: &TaskSpec, skip_permissions: Option<bool>) -> LaunchSpec {
    let mut args: Vec<String> = vec!["exec".into()];

    if let Some(session) = &task.session_id {
        args.push("resume".into());
        args.push(session.clone());
    }

    args.push("--json".into());
    args.push("--skip-git-repo-check".into());

    if skip_permissions.unwrap_or(true) {
        args.push("--dangerously-bypass-approvals-and-sandbox".into());
    }

    if let Some(model) = &task.model {
        args.push("-m".into());
        args.push(model.clone());
    }
    if let Some(effort) = task.reasoning_effort {
        args.push("-c".into());
        args.push(format!("model_reasoning_effort=\"{}\"", effort.as_str()));
    }

    LaunchSpec {
        program: "codex".to_string(),
        args,
        env: Vec::new(),
        prompt_in_argv: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_is_on_unless_explicitly_disabled() {
        let task = TaskSpec::new("t", "p");
        let spec = assemble(&task, None);
        assert!(spec
            .args
            .iter()
            .any(|a| a == "--dangerously-bypass-approvals-and-sandbox"));

        let spec = assemble(&task, Some(false));
        assert!(!spec
            .args
            .iter()
            .any(|a| a == "--dangerously-bypass-approvals-and-sandbox"));
    }

    #[test]
    fn git_repo_check_is_always_skipped() {
        let task = TaskSpec::new("t", "p");
        let spec = assemble(&task, Some(false));
        assert!(spec.args.iter().any(|a| a == "--skip-git-repo-check"));
    }

    #[test]
    fn resume_inserts_subcommand_with_session_id() {
        let mut task = TaskSpec::new("t", "p");
        task.session_id = Some("sess-1".into());
        let spec = assemble(&task, None);
        let pos = spec.args.iter().position(|a| a == "resume").unwrap();
        assert_eq!(spec.args[pos + 1], "sess-1");
    }

    #[test]
    fn model_and_reasoning_flags() {
        let mut task = TaskSpec::new("t", "p");
        task.model = Some("o4".into());
        task.reasoning_effort = crate::batch::ReasoningEffort::parse("high");
        let spec = assemble(&task, None);
        let m = spec.args.iter().position(|a| a == "-m").unwrap();
        assert_eq!(spec.args[m + 1], "o4");
        assert!(spec
            .args
            .iter()
            .any(|a| a == "model_reasoning_effort=\"high\""));
    }
}
