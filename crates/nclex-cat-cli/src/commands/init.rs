//! The `nclex-cat init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("nclex-cat.toml").exists() {
        println!("nclex-cat.toml already exists, skipping.");
    } else {
        std::fs::write("nclex-cat.toml", SAMPLE_CONFIG)?;
        println!("Created nclex-cat.toml");
    }

    std::fs::create_dir_all("item-banks")?;
    let example_path = std::path::Path::new("item-banks/example.toml");
    if example_path.exists() {
        println!("item-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created item-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Adjust the test policy in nclex-cat.toml");
    println!("  2. Run: nclex-cat validate --bank item-banks/example.toml");
    println!("  3. Run: nclex-cat simulate --synthetic 1000 --abilities=-1,0,1");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# nclex-cat configuration
# Every setting is optional; the values below are the defaults.

min_items = 75
max_items = 150
passing_threshold = 0.0
confidence_z = 1.96

# Ability estimation
theta_bound = 4.0
max_newton_iterations = 50
newton_tolerance = 1e-6
quadrature_points = 81

# Item selection
category_slack = 0.05
exposure_ratio_cap = 3.0
exposure_floor = 10

# Target share per client-needs category. Leave empty for a uniform split
# over the categories present in the bank.
[category_targets]
"Management of Care" = 0.18
"Safety and Infection Control" = 0.13
"Health Promotion and Maintenance" = 0.09
"Psychosocial Integrity" = 0.09
"Basic Care and Comfort" = 0.09
"Pharmacological and Parenteral Therapies" = 0.16
"Reduction of Risk Potential" = 0.12
"Physiological Adaptation" = 0.14
"#;

const EXAMPLE_BANK: &str = r#"[bank]
name = "Example bank"
description = "A small item bank to get started"

[[items]]
id = 1
category = "Management of Care"
stem = "Which client should the nurse see first after receiving the shift report?"
a = 1.3
b = 0.2
c = 0.2
correct = ["B"]
explanation = "An airway problem takes priority over stable clients."

[[items.options]]
id = "A"
text = "A client awaiting discharge teaching"

[[items.options]]
id = "B"
text = "A client with new-onset stridor"

[[items.options]]
id = "C"
text = "A client requesting pain medication for pain of 3/10"

[[items.options]]
id = "D"
text = "A client with a scheduled dressing change"

[[items]]
id = 2
category = "Pharmacological and Parenteral Therapies"
stem = "Select all signs of an anaphylactic reaction to a new antibiotic."
answer_type = "select_all"
a = 1.5
b = -0.4
c = 0.02
correct = ["A", "C", "D"]
explanation = "Wheezing, facial swelling and hypotension indicate anaphylaxis."

[[items.options]]
id = "A"
text = "Wheezing"

[[items.options]]
id = "B"
text = "Mild nausea"

[[items.options]]
id = "C"
text = "Swelling of the lips"

[[items.options]]
id = "D"
text = "Hypotension"
"#;
