//! Validate command

use clap::Args;

use metalnode_common::manifest::Bundle;

use super::{FileArgs, Session};
use crate::output::print_json;
use crate::output::OutputFormat;
use crate::Result;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub files: FileArgs,
}

/// Documents were parsed and validated while loading; report what was found
pub fn run(bundle: &Bundle, session: &Session) -> Result<()> {
    let ids: Vec<String> = bundle.documents.iter().map(|d| d.id()).collect();
    match session.output() {
        OutputFormat::Json => print_json(&ids),
        OutputFormat::Table => {
            for id in &ids {
                println!("  {} valid", id);
            }
            println!();
            println!("All validations passed ({} documents)", ids.len());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metalnode_common::testing::ScriptedCli;

    use super::*;
    use crate::commands::test_support::{bundle, session};

    #[test]
    fn validate_never_touches_the_cluster() {
        let cli = Arc::new(ScriptedCli::new());
        let b = bundle("apiVersion: metalnode.io/v1alpha1\nkind: NodeLabels\nmetadata:\n  name: a\n");
        run(&b, &session(cli.clone())).unwrap();
        assert!(cli.calls().is_empty());
    }
}
