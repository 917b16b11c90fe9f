//! Static-analysis tier over code-like arguments. Pattern-based: the
//! goal is refusing whole construct classes, not parsing shell.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::planner::ActionPlan;

static CHAINING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\|\||&&|;|\|)").unwrap());
static SUBSHELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\(|`").unwrap());
static REDIRECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">>?\s*(/\S+)").unwrap());
static DANGEROUS_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(exec|eval|import|system|subprocess)\b|__").unwrap());
static SQL_READONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|show)\b").unwrap());

/// A lint violation: the denied pattern's identifier plus detail.
pub type LintViolation = (String, String);

fn deny(pattern: &str, detail: String) -> Option<LintViolation> {
    Some((pattern.to_string(), detail))
}

fn lint_command(cmd: &str, fs_root: &Path) -> Option<LintViolation> {
    if CHAINING.is_match(cmd) {
        return deny("cmd_chaining", format!("chaining operator in '{cmd}'"));
    }
    if SUBSHELL.is_match(cmd) {
        return deny("subshell_interpolation", format!("subshell in '{cmd}'"));
    }
    if let Some(caps) = REDIRECT.captures(cmd) {
        let target = &caps[1];
        if !Path::new(target).starts_with(fs_root) {
            return deny(
                "redirect_outside_root",
                format!("redirection to '{target}' outside '{}'", fs_root.display()),
            );
        }
    }
    None
}

/// Lint the code-like arguments of a plan. `None` means clean.
pub fn lint_plan(plan: &ActionPlan, fs_root: &Path) -> Option<LintViolation> {
    if let Some(cmd) = plan.arg_str("cmd") {
        if let Some(v) = lint_command(cmd, fs_root) {
            return Some(v);
        }
    }
    if let Some(script) = plan.arg_str("script") {
        if let Some(v) = lint_command(script, fs_root) {
            return Some(v);
        }
    }
    if let Some(expression) = plan.arg_str("expression") {
        if DANGEROUS_EXPR.is_match(expression) {
            return deny("dangerous_expression", format!("denied name in '{expression}'"));
        }
    }
    if let Some(sql) = plan.arg_str("sql") {
        if !SQL_READONLY.is_match(sql) {
            return deny("sql_statement_denied", format!("only SELECT/SHOW allowed, got '{sql}'"));
        }
    }
    None
}
