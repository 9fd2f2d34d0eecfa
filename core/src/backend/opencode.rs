use super::LaunchSpec;
use crate::batch::TaskSpec;

/// Minimal adapter: `opencode run` in JSON mode, nothing backend-specific
/// beyond model and session selection.
pub(super) fn assemble(task: &TaskSpec) -> LaunchSpec {
    let mut args: Vec<String> = vec!["run".into(), "--format".into(), "json".into()];

    if let Some(model) = &task.model {
        args.push("--model".into());
        args.push(model.clone());
    }
    if let Some(session) = &task.session_id {
        args.push("--session".into());
        args.push(session.clone());
    }

    LaunchSpec {
        program: "opencode".to_string(),
        args,
        env: Vec::new(),
        prompt_in_argv: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_subcommand_with_json_format() {
        let task = TaskSpec::new("t", "p");
        let spec = assemble(&task);
        assert_eq!(spec.args[0], "run");
        assert!(spec.args.windows(2).any(|w| w[0] == "--format" && w[1] == "json"));
    }
}
