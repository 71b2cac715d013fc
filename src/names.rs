//! The `names` command: print the identifiers a migration would use.

use std::fmt::Write;

use migration_context::{MigrationContext, MAX_TABLE_NAME_LENGTH};

/// Render the derived table names and, for each of `triggers`, the shadow
/// trigger name and whether it fits the identifier limit.
pub fn render_names(context: &MigrationContext, triggers: &[String]) -> String {
    let mut out = String::new();
    let rows = [
        ("original", context.original_table_name().to_string()),
        ("ghost", context.ghost_table_name()),
        ("old", context.old_table_name()),
        ("changelog", context.changelog_table_name()),
    ];
    for (label, name) in rows {
        let _ = writeln!(out, "{label:<10} {name}");
    }

    for trigger in triggers {
        let ghost = context.ghost_trigger_name(trigger);
        let verdict = if context.validate_ghost_trigger_length_below_max_length(trigger) {
            "ok".to_string()
        } else {
            format!("too long: {} > {MAX_TABLE_NAME_LENGTH}", ghost.len())
        };
        let _ = writeln!(out, "trigger    {trigger} -> {ghost} ({verdict})");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table_names() {
        let context = MigrationContext::new("users").unwrap();
        let out = render_names(&context, &[]);
        assert_eq!(
            out,
            "original   users\nghost      _users_gho\nold        _users_del\nchangelog  _users_ghc\n"
        );
    }

    #[test]
    fn test_render_trigger_names() {
        let context = MigrationContext::new("users")
            .unwrap()
            .with_trigger_suffix("_gho");
        let long = "t".repeat(62);
        let out = render_names(&context, &["users_ins".to_string(), long.clone()]);

        assert!(out.contains("trigger    users_ins -> users_ins_gho (ok)"));
        assert!(out.contains(&format!("{long} -> {long}_gho (too long: 66 > 64)")));
    }
}
