//! Typed-phrase confirmations.
//!
//! Bypassing a security check requires typing a full word rather than `y`.
//! Prompts go to stderr so JSON on stdout stays clean. End of input or a
//! read error counts as a refusal.

use std::io::{BufRead, Write};
use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::policy::{phrase_matches, Decision, FORCE_PHRASE, UNSECURE_PHRASE};

/// Writes `message` to `out`, reads one line from `input`, and reports
/// whether it matches `phrase`.
pub fn prompt_phrase<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    message: &str,
    phrase: &str,
) -> bool {
    if write!(out, "{} ", message).and_then(|_| out.flush()).is_err() {
        return false;
    }

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => phrase_matches(&line, phrase),
    }
}

/// Asks `input`/`out` to continue without a malware scanner.
pub fn ask_unsecure<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> bool {
    let _ = writeln!(
        out,
        "\x1b[33mwarning:\x1b[0m No Socket.dev API token set. Malware detection is disabled."
    );
    let _ = writeln!(out, "Get a free API key at https://socket.dev and set SOCKET_API_TOKEN.");
    let _ = writeln!(out);

    prompt_phrase(
        input,
        out,
        &format!("Type '{}' to continue without malware scanning:", UNSECURE_PHRASE),
        UNSECURE_PHRASE,
    )
}

/// Asks `input`/`out` to proceed despite a policy block.
pub fn ask_force<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> bool {
    let _ = writeln!(out);

    prompt_phrase(
        input,
        out,
        &format!("Type '{}' to override security blocks (DANGEROUS):", FORCE_PHRASE),
        FORCE_PHRASE,
    )
}

/// Settles missing malware coverage before any scan starts.
///
/// Without a Socket.dev token, interactive runs must type the unsecure
/// phrase; non-interactive runs proceed with a warning. Either way Socket.dev
/// is disabled for the run.
///
/// # Errors
///
/// Returns [`Error::UserAbort`] if the phrase is refused.
pub fn acknowledge_coverage<R: BufRead, W: Write>(
    config: &mut Config,
    interactive: bool,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let has_token = config.has_socket_token();
    require_acknowledgment(
        &mut config.scanning.socket.enabled,
        has_token,
        interactive,
        input,
        out,
    )
}

fn require_acknowledgment<R: BufRead, W: Write>(
    socket_enabled: &mut bool,
    has_token: bool,
    interactive: bool,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    if !*socket_enabled || has_token {
        return Ok(());
    }

    if interactive {
        if !ask_unsecure(input, out) {
            return Err(Error::UserAbort);
        }
    } else {
        warn!("no Socket.dev API token, malware detection disabled");
    }

    *socket_enabled = false;
    Ok(())
}

/// Turns a decision into the final go/no-go for installation.
///
/// A pass proceeds. A block the policy does not allow overriding is final,
/// even with `force`. An overridable block proceeds when `force` was given
/// or the force phrase is typed.
///
/// # Errors
///
/// [`Error::PolicyBlock`] for a final block, [`Error::UserAbort`] when the
/// force phrase is refused.
pub fn resolve_block<R: BufRead, W: Write>(
    decision: Decision,
    force: bool,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    if !decision.is_blocked() {
        return Ok(());
    }

    if !decision.is_overridable() {
        if force {
            let _ = writeln!(
                out,
                "\x1b[33mwarning:\x1b[0m --force ignored; policy does not allow overriding this block"
            );
        }
        return decision.into_result();
    }

    if !force && !ask_force(input, out) {
        return Err(Error::UserAbort);
    }

    let _ = writeln!(out, "\x1b[33mwarning:\x1b[0m Proceeding despite security warnings...");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::exit_codes;
    use std::io::Cursor;

    fn ask(input: &str, phrase: &str) -> (bool, String) {
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let mut out = Vec::new();
        let accepted = prompt_phrase(&mut reader, &mut out, "Type it:", phrase);
        (accepted, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_exact_phrase_accepted() {
        let (accepted, shown) = ask("force\n", FORCE_PHRASE);
        assert!(accepted);
        assert_eq!(shown, "Type it: ");
    }

    #[test]
    fn test_phrase_is_case_insensitive() {
        assert!(ask("  UNSECURE  \n", UNSECURE_PHRASE).0);
    }

    #[test]
    fn test_anything_else_refused() {
        assert!(!ask("y\n", FORCE_PHRASE).0);
        assert!(!ask("\n", FORCE_PHRASE).0);
        assert!(!ask("forced\n", FORCE_PHRASE).0);
    }

    #[test]
    fn test_end_of_input_refused() {
        assert!(!ask("", UNSECURE_PHRASE).0);
    }

    #[test]
    fn test_only_first_line_counts() {
        assert!(!ask("no\nforce\n", FORCE_PHRASE).0);
    }

    fn blocked(overridable: bool) -> Decision {
        Decision::Block {
            reasons: vec!["malware detected".to_string()],
            warnings: vec![],
            overridable,
        }
    }

    fn resolve(decision: Decision, force: bool, typed: &str) -> (Result<()>, String) {
        let mut input = Cursor::new(typed.as_bytes().to_vec());
        let mut out = Vec::new();
        let outcome = resolve_block(decision, force, &mut input, &mut out);
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_pass_proceeds_without_prompt() {
        let (outcome, shown) = resolve(Decision::Pass { warnings: vec![] }, false, "");
        assert!(outcome.is_ok());
        assert!(shown.is_empty());
    }

    #[test]
    fn test_final_block_ignores_force() {
        let (outcome, shown) = resolve(blocked(false), true, "force\n");
        let err = outcome.unwrap_err();
        assert!(matches!(err, Error::PolicyBlock { .. }));
        assert_eq!(err.exit_code(), exit_codes::SECURITY_BLOCK);
        assert!(shown.contains("--force ignored"));
        assert!(!shown.contains("Type 'force'"));
    }

    #[test]
    fn test_final_block_never_prompts() {
        let (outcome, shown) = resolve(blocked(false), false, "force\n");
        assert_eq!(outcome.unwrap_err().exit_code(), exit_codes::SECURITY_BLOCK);
        assert!(shown.is_empty());
    }

    #[test]
    fn test_overridable_block_with_force_flag_skips_prompt() {
        let (outcome, shown) = resolve(blocked(true), true, "");
        assert!(outcome.is_ok());
        assert!(!shown.contains("Type 'force'"));
        assert!(shown.contains("Proceeding despite security warnings"));
    }

    #[test]
    fn test_overridable_block_accepts_typed_phrase() {
        let (outcome, shown) = resolve(blocked(true), false, "FORCE\n");
        assert!(outcome.is_ok());
        assert!(shown.contains("Type 'force'"));
    }

    #[test]
    fn test_overridable_block_refused_is_user_abort() {
        let (outcome, _) = resolve(blocked(true), false, "yes\n");
        let err = outcome.unwrap_err();
        assert!(matches!(err, Error::UserAbort));
        assert_eq!(err.exit_code(), exit_codes::USER_ABORT);
    }

    fn acknowledge(has_token: bool, interactive: bool, typed: &str) -> (Result<()>, bool, String) {
        let mut enabled = true;
        let mut input = Cursor::new(typed.as_bytes().to_vec());
        let mut out = Vec::new();
        let outcome = require_acknowledgment(&mut enabled, has_token, interactive, &mut input, &mut out);
        (outcome, enabled, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_token_present_needs_no_acknowledgment() {
        let (outcome, enabled, shown) = acknowledge(true, true, "");
        assert!(outcome.is_ok());
        assert!(enabled);
        assert!(shown.is_empty());
    }

    #[test]
    fn test_refusing_unsecure_aborts() {
        let (outcome, enabled, shown) = acknowledge(false, true, "no\n");
        let err = outcome.unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ABORT);
        assert!(enabled);
        assert!(shown.contains("Type 'unsecure'"));
    }

    #[test]
    fn test_accepting_unsecure_disables_socket() {
        let (outcome, enabled, _) = acknowledge(false, true, "unsecure\n");
        assert!(outcome.is_ok());
        assert!(!enabled);
    }

    #[test]
    fn test_non_interactive_runs_skip_prompt() {
        let (outcome, enabled, shown) = acknowledge(false, false, "");
        assert!(outcome.is_ok());
        assert!(!enabled);
        assert!(shown.is_empty());
    }

    #[test]
    fn test_disabled_socket_needs_no_acknowledgment() {
        let mut config = Config::default();
        config.scanning.socket.enabled = false;
        let mut input = Cursor::new(Vec::new());
        let mut out = Vec::new();

        acknowledge_coverage(&mut config, true, &mut input, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_configured_token_needs_no_acknowledgment() {
        let mut config = Config::default();
        config.scanning.socket.api_token = Some("sk_test".to_string());
        let mut input = Cursor::new(Vec::new());
        let mut out = Vec::new();

        acknowledge_coverage(&mut config, true, &mut input, &mut out).unwrap();
        assert!(config.scanning.socket.enabled);
        assert!(out.is_empty());
    }
}
