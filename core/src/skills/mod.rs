//! Skill resolution: turns skill names into a budgeted prompt fragment.
//!
//! Skills are `SKILL.md` documents under the user's codex or claude skill
//! directories. Each resolved skill is wrapped in a `<skill>` tag; the total
//! injected size is capped by a byte budget so a handful of large documents
//! cannot crowd out the actual task.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::DEFAULT_SKILL_BUDGET;

/// One resolved skill: the name, where it came from, the post-frontmatter
/// body, and what it cost against the budget.
#[derive(Debug, Clone)]
pub struct SkillBlock {
    pub name: String,
    pub path: PathBuf,
    pub body: String,
    pub budget_cost: usize,
}

/// Skill names are restricted to a safe character class; anything else could
/// escape the skills directory.
fn valid_skill_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

/// Tech-stack fingerprints: any listed file in the workdir maps to the
/// paired skill names.
const TECH_SKILL_MAP: &[(&[&str], &[&str])] = &[
    (&["go.mod", "go.sum"], &["golang-base-practices"]),
    (&["Cargo.toml"], &["rust-best-practices"]),
    (
        &["pyproject.toml", "setup.py", "requirements.txt", "Pipfile"],
        &["python-best-practices"],
    ),
    (
        &["package.json"],
        &["vercel-react-best-practices", "frontend-design"],
    ),
    (
        &["vue.config.js", "vite.config.ts", "nuxt.config.ts"],
        &["vue-web-app"],
    ),
];

fn skill_roots() -> Vec<PathBuf> {
    let Some(home) = crate::util::home_dir() else {
        return Vec::new();
    };
    vec![
        home.join(".codex").join("skills"),
        home.join(".claude").join("skills"),
    ]
}

/// Locate `SKILL.md` for a name, preferring the codex directory.
fn find_skill_file(name: &str) -> Option<PathBuf> {
    for root in skill_roots() {
        let path = root.join(name).join("SKILL.md");
        if path.is_file() {
            return Some(path);
        }
    }
    None
}

/// Scan `workdir` for tech-stack fingerprints and return the matching skills
/// that are actually installed. Deduplicated, detection order preserved.
pub fn detect_project_skills(workdir: &Path) -> Vec<String> {
    let mut detected = Vec::new();
    for (files, skills) in TECH_SKILL_MAP {
        if !files.iter().any(|f| workdir.join(f).exists()) {
            continue;
        }
        for skill in *skills {
            if detected.iter().any(|s: &String| s == skill) {
                continue;
            }
            if find_skill_file(skill).is_some() {
                detected.push(skill.to_string());
            }
        }
    }
    detected
}

/// Resolve skill names into wrapped blocks under a byte budget.
///
/// For each skill the wrap overhead is charged first; a body that exceeds
/// the remaining budget is truncated (with a warning), and once nothing
/// remains further skills are dropped entirely.
pub fn resolve_skill_blocks(names: &[String], max_budget: usize) -> Vec<SkillBlock> {
    let budget = if max_budget == 0 {
        DEFAULT_SKILL_BUDGET
    } else {
        max_budget
    };
    let mut remaining = budget;
    let mut blocks = Vec::new();

    for raw in names {
        let name = raw.trim();
        if name.is_empty() {
            continue;
        }
        if !valid_skill_name().is_match(name) {
            tracing::warn!(skill = %name, "invalid skill name, skipping");
            continue;
        }
        let Some(path) = find_skill_file(name) else {
            tracing::warn!(skill = %name, "SKILL.md not found, skipping");
            continue;
        };
        let Ok(raw_body) = std::fs::read_to_string(&path) else {
            tracing::warn!(skill = %name, path = %path.display(), "unreadable SKILL.md, skipping");
            continue;
        };
        if raw_body.trim().is_empty() {
            tracing::warn!(skill = %name, "empty SKILL.md, skipping");
            continue;
        }

        let mut body = strip_yaml_frontmatter(raw_body.trim()).to_string();

        let tag_overhead = "<skill name=\"\">".len() + name.len() + "\n".len() + "\n</skill>".len();
        if remaining <= tag_overhead {
            tracing::warn!(skill = %name, "skill budget exhausted, dropping remaining skills");
            break;
        }
        let body_budget = remaining - tag_overhead;
        if body.len() > body_budget {
            tracing::warn!(
                skill = %name,
                from = body.len(),
                to = body_budget,
                "truncating skill body to fit budget"
            );
            let mut end = body_budget;
            while end > 0 && !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        let cost = body.len() + tag_overhead;
        remaining -= cost;
        blocks.push(SkillBlock {
            name: name.to_string(),
            path,
            body,
            budget_cost: cost,
        });
        if remaining == 0 {
            break;
        }
    }

    blocks
}

/// Render resolved blocks as the prompt fragment: `<skill>` wrapped bodies
/// joined by a blank line.
pub fn render_skill_blocks(blocks: &[SkillBlock]) -> String {
    blocks
        .iter()
        .map(|b| format!("<skill name=\"{}\">\n{}\n</skill>", b.name, b.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Strip one leading YAML front-matter block bracketed by `---` lines.
/// Idempotent: a body without front-matter passes through untouched.
pub fn strip_yaml_frontmatter(s: &str) -> String {
    let s = s.replace("\r\n", "\n");
    if !s.starts_with("---") {
        return s;
    }
    let Some(idx) = s[3..].find("\n---") else {
        return s;
    };
    let mut rest = &s[3 + idx + 4..];
    if let Some(stripped) = rest.strip_prefix('\n') {
        rest = stripped;
    }
    rest.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    // HOME mutation is process-global; serialize tests that touch it.
    fn home_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }

    fn install_skill(home: &Path, root: &str, name: &str, content: &str) {
        let dir = home.join(root).join("skills").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), content).unwrap();
    }

    #[test]
    fn frontmatter_strip_is_idempotent() {
        let input = "---\nname: test\ndescription: foo\n---\n\n# Body\nContent here.";
        let once = strip_yaml_frontmatter(input);
        assert_eq!(once, "# Body\nContent here.");
        assert_eq!(strip_yaml_frontmatter(&once), once);
    }

    #[test]
    fn frontmatter_strip_handles_crlf_and_only_frontmatter() {
        assert_eq!(
            strip_yaml_frontmatter("---\r\nname: test\r\n---\r\n\r\n# Body\r\nContent."),
            "# Body\nContent."
        );
        assert_eq!(strip_yaml_frontmatter("---\nname: test\n---"), "");
        assert_eq!(
            strip_yaml_frontmatter("# No frontmatter\nhere"),
            "# No frontmatter\nhere"
        );
    }

    #[test]
    fn resolves_and_wraps_a_skill() {
        let _g = home_lock();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        install_skill(
            home.path(),
            ".codex",
            "test-skill",
            "---\nname: test\n---\n\n# Test Skill\nBest practices here.",
        );

        let blocks = resolve_skill_blocks(&["test-skill".to_string()], 0);
        assert_eq!(blocks.len(), 1);
        let text = render_skill_blocks(&blocks);
        assert!(text.starts_with("<skill name=\"test-skill\">"));
        assert!(text.ends_with("</skill>"));
        assert!(text.contains("# Test Skill"));
        assert!(!text.contains("name: test"));
    }

    #[test]
    fn codex_directory_wins_over_claude() {
        let _g = home_lock();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        install_skill(home.path(), ".codex", "dup", "# Codex copy");
        install_skill(home.path(), ".claude", "dup", "# Claude copy");

        let blocks = resolve_skill_blocks(&["dup".to_string()], 0);
        assert!(blocks[0].body.contains("Codex copy"));
    }

    #[test]
    fn traversal_names_are_dropped() {
        let _g = home_lock();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());

        for bad in ["../../../etc/passwd", "foo/bar", "a b", "skill.name"] {
            assert!(resolve_skill_blocks(&[bad.to_string()], 0).is_empty());
        }
    }

    #[test]
    fn budget_truncates_then_omits() {
        let _g = home_lock();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        let big = "x".repeat(10_000);
        install_skill(home.path(), ".codex", "s1", &big);
        install_skill(home.path(), ".codex", "s2", &big);
        install_skill(home.path(), ".codex", "s3", &big);

        let names: Vec<String> = ["s1", "s2", "s3"].iter().map(|s| s.to_string()).collect();
        let blocks = resolve_skill_blocks(&names, 16_000);

        // s1 fits whole, s2 is truncated to the remainder, s3 is dropped.
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].body.len(), 10_000);
        assert!(blocks[1].body.len() < 10_000);
        assert!(!blocks[1].body.is_empty());

        let total: usize = blocks.iter().map(|b| b.budget_cost).sum();
        assert!(total <= 16_000);
        assert!(render_skill_blocks(&blocks).len() <= 16_000 + 2); // joiner newlines
    }

    #[test]
    fn detection_finds_installed_skills_only() {
        let _g = home_lock();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        install_skill(home.path(), ".codex", "rust-best-practices", "# rust\n");

        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("Cargo.toml"), "[package]").unwrap();
        std::fs::write(work.path().join("go.mod"), "module x").unwrap();

        // golang-base-practices is mapped but not installed.
        let detected = detect_project_skills(work.path());
        assert_eq!(detected, vec!["rust-best-practices".to_string()]);
    }

    #[test]
    fn detection_of_empty_dir_is_empty() {
        let _g = home_lock();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        let work = tempfile::tempdir().unwrap();
        assert!(detect_project_skills(work.path()).is_empty());
    }
}
