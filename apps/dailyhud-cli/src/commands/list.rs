//! List the check registry

use dailyhud_checks::all_checks;

pub fn run(json: bool) -> anyhow::Result<()> {
    let checks = all_checks();

    if json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
        return Ok(());
    }

    println!("{:<12} {:<14} {}", "CHECK", "SECTION", "SECRET");
    for check in &checks {
        println!(
            "{:<12} {:<14} {}",
            check.id,
            check.section,
            check.required_secret.unwrap_or("-")
        );
    }
    Ok(())
}
