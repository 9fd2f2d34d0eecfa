use std::collections::HashMap;

use super::LaunchSpec;
use crate::batch::TaskSpec;

/// Environment keys recognized in `~/.gemini/.env` and forwarded to the
/// child process.
const FORWARDED_KEYS: &[&str] = &[
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "GEMINI_MODEL",
    "GOOGLE_GENAI_AUTH",
];

pub(super) fn assemble(task: &TaskSpec, skip_permissions: Option<bool>) -> LaunchSpec {
    let mut args: Vec<String> = vec!["--output-format".into(), "stream-json".into()];
    let mut env: Vec<(String, String)> = Vec::new();

    let dotenv = load_gemini_dotenv();
    let mut has_api_key = false;
    for key in FORWARDED_KEYS {
        if let Some(v) = dotenv.get(*key) {
            if *key == "GEMINI_API_KEY" || *key == "GOOGLE_API_KEY" {
                has_api_key = true;
            }
            env.push((key.to_string(), v.clone()));
        }
    }
    // An API key only works with bearer auth; pin it so a stale auth
    // mechanism in the dotenv cannot break the run.
    if has_api_key {
        env.retain(|(k, _)| k != "GOOGLE_GENAI_AUTH");
        env.push(("GOOGLE_GENAI_AUTH".into(), "bearer".into()));
    }

    if let Some(model) = task.model.clone().or_else(|| dotenv.get("GEMINI_MODEL").cloned()) {
        args.push("-m".into());
        args.push(model);
    }

    if let Some(session) = &task.session_id {
        args.push("--resume".into());
        args.push(session.clone());
    }

    if skip_permissions.unwrap_or(false) {
        args.push("--yolo".into());
    }

    LaunchSpec {
        program: "gemini".to_string(),
        args,
        env,
        prompt_in_argv: false,
    }
}

fn load_gemini_dotenv() -> HashMap<String, String> {
    let Some(path) = crate::util::home_dir().map(|h| h.join(".gemini").join(".env")) else {
        return HashMap::new();
    };
    let Ok(raw) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    parse_dotenv(&raw)
}

fn parse_dotenv(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let v = v.trim().trim_matches('"').trim_matches('\'');
        out.insert(k.trim().to_string(), v.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_skips_comments_and_quotes() {
        let raw = "# comment\nGEMINI_API_KEY=\"abc\"\nGEMINI_MODEL='flash'\nbroken line\n";
        let map = parse_dotenv(raw);
        assert_eq!(map.get("GEMINI_API_KEY").map(String::as_str), Some("abc"));
        assert_eq!(map.get("GEMINI_MODEL").map(String::as_str), Some("flash"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn yolo_flag_requires_opt_in() {
        let task = TaskSpec::new("t", "p");
        assert!(!assemble(&task, None).args.iter().any(|a| a == "--yolo"));
        assert!(assemble(&task, Some(true)).args.iter().any(|a| a == "--yolo"));
    }

    #[test]
    fn task_model_beats_dotenv_model() {
        let mut task = TaskSpec::new("t", "p");
        task.model = Some("pro".into());
        let spec = assemble(&task, None);
        let m = spec.args.iter().position(|a| a == "-m").unwrap();
        assert_eq!(spec.args[m + 1], "pro");
    }
}
