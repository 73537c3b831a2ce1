use crate::output::UserOutput;
use global_services::{Error, MigrationRunner};

pub fn run_migrate(runner: &MigrationRunner<'_>, list: bool, out: &dyn UserOutput) -> anyhow::Result<()> {
    if list {
        for status in runner.list()? {
            let marker = if status.applied { "applied" } else { "pending" };
            out.status(&format!("  {}  {:<28} {}", status.identifier, status.name, marker));
        }
        return Ok(());
    }

    out.status("Applying migrations...");
    let report = match runner.run() {
        Ok(report) => report,
        Err(e) => {
            if let Error::MigrationFailed {
                identifier, name, ..
            } = &e
            {
                out.error(&format!(
                    "Migration {} ({}) failed; later migrations were not run",
                    identifier, name
                ));
            }
            return Err(e.into());
        }
    };
    if report.is_empty() {
        out.success("Global services are up to date");
        return Ok(());
    }

    for identifier in &report.applied {
        out.status(&format!("  applied {}", identifier));
    }
    if !report.skipped.is_empty() {
        out.status(&format!("  {} migration(s) not applicable, recorded", report.skipped.len()));
    }
    out.success(&format!(
        "Migrations complete: {} applied, {} skipped",
        report.applied.len(),
        report.skipped.len()
    ));
    Ok(())
}
