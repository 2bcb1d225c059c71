//! Simulation scenarios.
//!
//! A scenario seeds a ledger and replays RPC calls against the coordinator.
//! Every call step names the outcome it expects; the controller fails the
//! run at the first step whose outcome differs.

use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Accounts opened before the first step, as `(account, balance)`.
    pub accounts: Vec<(u64, i64)>,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// Expected result of an RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expect {
    /// The call replies `successful: true`.
    Success,
    /// The call fails with the given error code.
    Rejected { code: String },
}

impl Expect {
    fn rejected(code: &str) -> Self {
        Self::Rejected {
            code: code.to_string(),
        }
    }
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Wait for a duration.
    Wait { millis: u64 },
    /// Send `GetLock`.
    GetLock {
        transaction: u64,
        account: u64,
        amount: i64,
        expect: Expect,
    },
    /// Send `GetLock` for every transaction at once against one account.
    ConcurrentGetLock {
        transactions: Vec<u64>,
        account: u64,
        amount: i64,
        granted: usize,
    },
    /// Send `Commit`.
    Commit { transaction: u64, expect: Expect },
    /// Send `Abort`. Abort always succeeds.
    Abort { transaction: u64 },
    /// Check a ledger balance.
    AssertBalance { account: u64, balance: i64 },
    /// Check whether an account is locked.
    AssertLocked { account: u64, locked: bool },
}

impl Scenario {
    /// Names of the built-in scenarios.
    pub const BUILT_IN: [&'static str; 5] = [
        "happy-path",
        "lock-conflict",
        "insufficient-funds",
        "unknown-commit",
        "contention",
    ];

    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "happy-path" => Ok(Self::happy_path()),
            "lock-conflict" => Ok(Self::lock_conflict()),
            "insufficient-funds" => Ok(Self::insufficient_funds()),
            "unknown-commit" => Ok(Self::unknown_commit()),
            "contention" => Ok(Self::contention()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Parse a scenario from JSON.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reserve then commit a single payment.
    fn happy_path() -> Self {
        Self {
            name: "happy-path".to_string(),
            description: "Reserve 40 on an account holding 100, then commit".to_string(),
            accounts: vec![(1, 100)],
            steps: vec![
                ScenarioStep::GetLock {
                    transaction: 5,
                    account: 1,
                    amount: 40,
                    expect: Expect::Success,
                },
                ScenarioStep::AssertLocked {
                    account: 1,
                    locked: true,
                },
                ScenarioStep::AssertBalance {
                    account: 1,
                    balance: 100,
                },
                ScenarioStep::Commit {
                    transaction: 5,
                    expect: Expect::Success,
                },
                ScenarioStep::AssertBalance {
                    account: 1,
                    balance: 60,
                },
                ScenarioStep::AssertLocked {
                    account: 1,
                    locked: false,
                },
            ],
        }
    }

    /// A second reservation on a locked account is refused until abort.
    fn lock_conflict() -> Self {
        Self {
            name: "lock-conflict".to_string(),
            description: "Competing reservation is refused, then allowed after abort".to_string(),
            accounts: vec![(1, 100)],
            steps: vec![
                ScenarioStep::GetLock {
                    transaction: 6,
                    account: 1,
                    amount: 40,
                    expect: Expect::Success,
                },
                ScenarioStep::GetLock {
                    transaction: 7,
                    account: 1,
                    amount: 10,
                    expect: Expect::rejected("LOCK_CONFLICT"),
                },
                ScenarioStep::Abort { transaction: 6 },
                ScenarioStep::AssertBalance {
                    account: 1,
                    balance: 100,
                },
                ScenarioStep::GetLock {
                    transaction: 8,
                    account: 1,
                    amount: 10,
                    expect: Expect::Success,
                },
                ScenarioStep::Commit {
                    transaction: 8,
                    expect: Expect::Success,
                },
                ScenarioStep::AssertBalance {
                    account: 1,
                    balance: 90,
                },
            ],
        }
    }

    /// Over-balance reservations are refused without locking.
    fn insufficient_funds() -> Self {
        Self {
            name: "insufficient-funds".to_string(),
            description: "Reservation above balance is refused and leaves no lock".to_string(),
            accounts: vec![(2, 5)],
            steps: vec![
                ScenarioStep::GetLock {
                    transaction: 9,
                    account: 2,
                    amount: 10,
                    expect: Expect::rejected("INSUFFICIENT_FUNDS"),
                },
                ScenarioStep::AssertLocked {
                    account: 2,
                    locked: false,
                },
                ScenarioStep::GetLock {
                    transaction: 10,
                    account: 2,
                    amount: 5,
                    expect: Expect::Success,
                },
                ScenarioStep::Commit {
                    transaction: 10,
                    expect: Expect::Success,
                },
                ScenarioStep::AssertBalance {
                    account: 2,
                    balance: 0,
                },
            ],
        }
    }

    /// Resolving a transaction that was never reserved.
    fn unknown_commit() -> Self {
        Self {
            name: "unknown-commit".to_string(),
            description: "Commit of an unknown payment fails, abort succeeds".to_string(),
            accounts: vec![(1, 100)],
            steps: vec![
                ScenarioStep::Commit {
                    transaction: 999,
                    expect: Expect::rejected("PAYMENT_NOT_FOUND"),
                },
                ScenarioStep::Abort { transaction: 999 },
                ScenarioStep::AssertBalance {
                    account: 1,
                    balance: 100,
                },
            ],
        }
    }

    /// Many simultaneous reservations on one account.
    fn contention() -> Self {
        let transactions: Vec<u64> = (100..116).collect();
        let mut steps = vec![ScenarioStep::ConcurrentGetLock {
            transactions: transactions.clone(),
            account: 1,
            amount: 40,
            granted: 1,
        }];
        steps.extend(
            transactions
                .into_iter()
                .map(|transaction| ScenarioStep::Abort { transaction }),
        );
        steps.push(ScenarioStep::AssertLocked {
            account: 1,
            locked: false,
        });
        steps.push(ScenarioStep::AssertBalance {
            account: 1,
            balance: 50,
        });

        Self {
            name: "contention".to_string(),
            description: "Sixteen concurrent reservations, exactly one granted".to_string(),
            accounts: vec![(1, 50)],
            steps,
        }
    }
}
