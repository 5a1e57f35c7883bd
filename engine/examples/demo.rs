//! Interactive CLI demo of the full Cascade vault tree lifecycle.
//!
//! Walks through tree construction, a deposit that cascades through two
//! ancestors, a grant that raises the share price, a withdrawal at the
//! improved price, a controller payout, and a closing conservation audit.
//! The output uses ANSI escape codes for colored, storytelling-style
//! terminal rendering.
//!
//! Run with:
//!   cargo run -p cascade-engine --example demo

use std::sync::Arc;
use std::time::Instant;

use cascade_engine::{
    AssetId, EngineConfig, EngineEvent, InMemoryAssetBank, MemoryEventSink, VaultEngine, VaultId,
    VaultParams,
};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    CASCADE  --  Vault Tree Lifecycle Demo                          {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    Version 0.1.0  |  Floor-Exact Splits + All-Or-Nothing Commits   {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn vault_row(name: &str, id: VaultId, level: u32, percent: u32, color: &str) {
    let id_str = id.to_string();
    println!(
        "  {color}{BOLD}{name:<10}{RESET}  {DIM}{}...{RESET}  level={WHITE}{level}{RESET}  upstream={WHITE}{}.{:02}%{RESET}",
        &id_str[..8],
        percent / 100,
        percent % 100,
    );
}

fn balance_row(name: &str, assets: u128, shares: u128, color: &str) {
    println!(
        "  {color}{BOLD}{name:<10}{RESET}  {WHITE}{assets:>10}{RESET} {DIM}units{RESET}  {WHITE}{shares:>10}{RESET} {DIM}shares{RESET}"
    );
}

fn separator() {
    println!(
        "{DIM}{CYAN}  . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . {RESET}"
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

const ALICE: &str = "acct:alice";
const BOB: &str = "acct:bob";
const FOUNDATION: &str = "acct:foundation";
const AUDITOR: &str = "acct:auditor";

fn main() {
    let demo_start = Instant::now();

    banner();

    let usd = AssetId::new("asset:usd");
    let bank = Arc::new(InMemoryAssetBank::new());
    let sink = Arc::new(MemoryEventSink::new());
    let mut engine = VaultEngine::new(
        EngineConfig::default(),
        Arc::clone(&bank),
        Arc::clone(&sink),
    );

    // -----------------------------------------------------------------------
    // Step 1: Build the funding hierarchy
    // -----------------------------------------------------------------------

    section(1, "Funding Hierarchy Construction");
    subsection("Creating a three-level tree: foundation -> program -> project...");

    let t = Instant::now();
    let foundation = engine
        .create(
            FOUNDATION,
            VaultParams {
                asset: usd.clone(),
                parent: None,
                percent: 0,
                metadata: "bafy-foundation".to_string(),
            },
        )
        .unwrap();
    let program = engine
        .create(
            FOUNDATION,
            VaultParams {
                asset: usd.clone(),
                parent: Some(foundation),
                percent: 1000, // 10% of everything it receives flows up
                metadata: "bafy-program".to_string(),
            },
        )
        .unwrap();
    let project = engine
        .create(
            ALICE,
            VaultParams {
                asset: usd.clone(),
                parent: Some(program),
                percent: 1000, // 10% again
                metadata: "bafy-project".to_string(),
            },
        )
        .unwrap();
    timing("3x vault creation", t.elapsed());

    println!();
    vault_row("Foundation", foundation, 0, 0, BLUE);
    vault_row("Program", program, 1, 1000, GREEN);
    vault_row("Project", project, 2, 1000, MAGENTA);
    println!();

    assert_eq!(engine.tree_level(foundation).unwrap(), 0);
    assert_eq!(engine.tree_level(program).unwrap(), 1);
    assert_eq!(engine.tree_level(project).unwrap(), 2);
    assert!(engine.is_child_vault(foundation, program).unwrap());
    assert!(engine.is_child_vault(program, project).unwrap());
    // Membership is direct-only: the foundation does not see grandchildren.
    assert!(!engine.is_child_vault(foundation, project).unwrap());
    success("Tree levels cached, parent links fixed, membership direct-only");

    // -----------------------------------------------------------------------
    // Step 2: Seed the settlement rail
    // -----------------------------------------------------------------------

    section(2, "Settlement Rail Seeding");
    subsection("Minting demo balances into the in-memory reference bank...");

    bank.mint(&usd, ALICE, 100_000).unwrap();
    bank.mint(&usd, BOB, 9_000).unwrap();

    info("Alice", "100000 units");
    info("Bob", "9000 units");
    success("Accounts funded on the reference rail");

    // -----------------------------------------------------------------------
    // Step 3: Deposit with a two-hop cascade
    // -----------------------------------------------------------------------

    section(3, "Deposit: Alice -> Project (100,000 units)");
    subsection("10% cascades to the program, 10% of that to the foundation...");

    let t = Instant::now();
    let minted = engine.deposit(project, ALICE, 100_000, ALICE).unwrap();
    timing("deposit + full cascade", t.elapsed());

    info("Shares minted to Alice", &minted.to_string());

    separator();
    println!();
    println!("  {BOLD}{WHITE}--- Balances After Deposit ---{RESET}");
    let project_view = engine.balance(project).unwrap();
    let program_view = engine.balance(program).unwrap();
    let foundation_view = engine.balance(foundation).unwrap();
    balance_row("Project", project_view.assets, project_view.shares, MAGENTA);
    balance_row("Program", program_view.assets, program_view.shares, GREEN);
    balance_row(
        "Foundation",
        foundation_view.assets,
        foundation_view.shares,
        BLUE,
    );
    println!();

    // 100,000 in: project keeps 90,000, program keeps 9,000 of its 10,000,
    // the foundation keeps the final 1,000. Nothing minted above the origin.
    assert_eq!(project_view.assets, 90_000);
    assert_eq!(program_view.assets, 9_000);
    assert_eq!(foundation_view.assets, 1_000);
    assert_eq!(minted, 90_000);
    assert_eq!(program_view.shares, 0);
    assert_eq!(foundation_view.shares, 0);
    assert_eq!(
        project_view.assets + program_view.assets + foundation_view.assets,
        100_000
    );
    success("Conservation holds: 90,000 + 9,000 + 1,000 = 100,000");

    // -----------------------------------------------------------------------
    // Step 4: Grant raises the share price
    // -----------------------------------------------------------------------

    section(4, "Grant: Bob -> Project (9,000 units, no shares)");
    subsection("Funding without propagation: assets rise, supply does not...");

    let t = Instant::now();
    engine.fund(project, BOB, 9_000, false).unwrap();
    timing("fund", t.elapsed());

    let after_grant = engine.balance(project).unwrap();
    assert_eq!(after_grant.assets, 99_000);
    assert_eq!(after_grant.shares, 90_000);

    info("Project assets", &after_grant.assets.to_string());
    info("Project shares", &after_grant.shares.to_string());
    info("Effective price", "99000/90000 = 1.1 units per share");
    success("Grant committed: every existing share is now worth more");

    // -----------------------------------------------------------------------
    // Step 5: Withdraw at the improved price
    // -----------------------------------------------------------------------

    section(5, "Withdraw: Alice <- Project (33,000 units)");
    subsection("Burning shares at the post-grant ratio...");

    let t = Instant::now();
    let burned = engine.withdraw(project, ALICE, 33_000, ALICE).unwrap();
    timing("withdraw", t.elapsed());

    // floor(33,000 * 90,000 / 99,000) = 30,000 shares buy 33,000 units out.
    assert_eq!(burned, 30_000);
    assert_eq!(bank.balance_of(&usd, ALICE), 33_000);

    let after_withdraw = engine.balance(project).unwrap();
    info("Shares burned", &burned.to_string());
    info("Alice's rail balance", &bank.balance_of(&usd, ALICE).to_string());
    info(
        "Project after",
        &format!(
            "{} units / {} shares",
            after_withdraw.assets, after_withdraw.shares
        ),
    );
    success("33,000 units cost only 30,000 shares -- the grant did that");

    // -----------------------------------------------------------------------
    // Step 6: Controller payout
    // -----------------------------------------------------------------------

    section(6, "Payout: Foundation -> Auditor (500 units)");
    subsection("Discretionary disbursement by the vault's controller...");

    // Only the controller may do this.
    assert!(engine.payout(foundation, ALICE, 500, AUDITOR).is_err());
    engine.payout(foundation, FOUNDATION, 500, AUDITOR).unwrap();

    assert_eq!(engine.balance(foundation).unwrap().assets, 500);
    assert_eq!(bank.balance_of(&usd, AUDITOR), 500);
    info("Foundation retains", "500 units");
    info("Auditor received", "500 units");
    success("Payout committed without touching any share ledger");

    // -----------------------------------------------------------------------
    // Step 7: Conservation audit
    // -----------------------------------------------------------------------

    section(7, "Closing Conservation Audit");
    subsection("Every unit that entered is retained somewhere or was paid out...");

    let retained: u128 = [project, program, foundation]
        .iter()
        .map(|v| engine.balance(*v).unwrap().assets)
        .sum();
    let paid_out = bank.balance_of(&usd, ALICE) + bank.balance_of(&usd, AUDITOR);
    let contributed: u128 = 100_000 + 9_000;

    info("Contributed", &contributed.to_string());
    info("Retained across the tree", &retained.to_string());
    info("Paid back out", &paid_out.to_string());

    assert_eq!(retained + paid_out, contributed);
    assert_eq!(bank.custody_balance(&usd), retained);

    let events = sink.take();
    let cascade_hops = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Funded { .. }))
        .count();
    info("Facts emitted", &events.len().to_string());
    info("Funded facts (grant + cascade hops)", &cascade_hops.to_string());
    success("Books balance to the unit; the bank agrees with the tree");

    // -----------------------------------------------------------------------
    // Final Summary
    // -----------------------------------------------------------------------

    let total_elapsed = demo_start.elapsed();

    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    DEMO COMPLETE -- Final Summary                                  {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();

    println!("  {BOLD}{WHITE}Engine Statistics:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    info("Vaults created", "3 (foundation, program, project)");
    info("Cascade depth exercised", "2 hops (project -> program -> foundation)");
    info("Operations committed", "1 deposit, 1 grant, 1 withdrawal, 1 payout");
    info("Split arithmetic", "basis points, floor division, u128");
    info("Atomicity model", "plan-then-apply, all-or-nothing");
    info("Accounting facts", &format!("{} emitted, in commit order", events.len()));
    println!();

    println!("  {BOLD}{WHITE}Final Balances:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    let p = engine.balance(project).unwrap();
    let g = engine.balance(program).unwrap();
    let f = engine.balance(foundation).unwrap();
    balance_row("Project", p.assets, p.shares, MAGENTA);
    balance_row("Program", g.assets, g.shares, GREEN);
    balance_row("Foundation", f.assets, f.shares, BLUE);

    println!();
    println!(
        "  {ITALIC}{DIM}Conservation check: {retained} units retained + {paid_out} paid out = {contributed} contributed{RESET}"
    );

    println!();
    println!(
        "  {BOLD}{GREEN}Total demo time: {:.2}s{RESET}",
        total_elapsed.as_secs_f64()
    );
    println!();
}
