//! JSON scenario scripts.
//!
//! A script funds accounts in an in-memory bank, then replays timed steps
//! against a fresh escrow. Each step yields one [`Outcome`]; a failing step
//! is reported and the run continues.
//!
//! ```json
//! {
//!   "genesis": 1693440000,
//!   "funding": [{ "account": "01..01", "asset": "Locked", "amount": 8000000000000000000 }],
//!   "steps": [
//!     { "at": 1693440000, "op": { "create_lock": { "caller": "01..01", "amount": 8000000000000000000, "duration": 604800 } } },
//!     { "at": 1693440000, "op": { "lock_permanent": { "caller": "01..01", "id": 1 } } }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sluice_core::bank::{MemoryBank, MemoryResolver};
use sluice_core::config::EscrowConfig;
use sluice_core::error::EscrowError;
use sluice_core::types::{AccountId, Asset, RecordId, RewardKind};
use sluice_decay::CheckpointProgress;
use sluice_escrow::{Escrow, Reshape, RewardPayout, Withdrawal};

type ScriptEscrow = Escrow<MemoryBank, MemoryResolver>;

#[derive(Deserialize, Debug)]
pub struct Script {
    pub genesis: u64,
    #[serde(default)]
    pub funding: Vec<Funding>,
    pub steps: Vec<Step>,
}

#[derive(Deserialize, Debug)]
pub struct Funding {
    pub account: AccountId,
    pub asset: Asset,
    pub amount: u128,
}

#[derive(Deserialize, Debug)]
pub struct Step {
    pub at: u64,
    pub op: Op,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Checkpoint,
    CreateLock { caller: AccountId, amount: u128, duration: u64 },
    CreateLockFor { caller: AccountId, beneficiary: AccountId, amount: u128, duration: u64 },
    DepositFor { caller: AccountId, id: RecordId, amount: u128 },
    IncreaseAmount { caller: AccountId, id: RecordId, amount: u128 },
    IncreaseUnlockTime { caller: AccountId, id: RecordId, duration: u64 },
    Withdraw { caller: AccountId, id: RecordId },
    EarlyWithdraw { caller: AccountId, id: RecordId },
    LockPermanent { caller: AccountId, id: RecordId },
    UnlockPermanent { caller: AccountId, id: RecordId },
    Merge { caller: AccountId, from: RecordId, to: RecordId },
    Split { caller: AccountId, id: RecordId, amount: u128 },
    Approve { caller: AccountId, id: RecordId, approved: Option<AccountId> },
    SetApprovalForAll { caller: AccountId, operator: AccountId, approved: bool },
    Transfer { caller: AccountId, id: RecordId, to: AccountId },
    ToggleSplit { account: Option<AccountId>, allowed: bool },
    Notify { caller: AccountId, kinds: Vec<RewardKind>, amounts: Vec<u128> },
    GetReward {
        caller: AccountId,
        ids: Vec<RecordId>,
        kinds: Vec<RewardKind>,
        #[serde(default)]
        until: Option<u64>,
    },
    EnableSelfRepay { caller: AccountId, ids: Vec<RecordId> },
    DisableSelfRepay { caller: AccountId, ids: Vec<RecordId> },
    Weight { id: RecordId },
    TotalWeight,
    Earned { id: RecordId, kind: RewardKind },
    Balance { account: AccountId, asset: Asset },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoint",
            Self::CreateLock { .. } => "create_lock",
            Self::CreateLockFor { .. } => "create_lock_for",
            Self::DepositFor { .. } => "deposit_for",
            Self::IncreaseAmount { .. } => "increase_amount",
            Self::IncreaseUnlockTime { .. } => "increase_unlock_time",
            Self::Withdraw { .. } => "withdraw",
            Self::EarlyWithdraw { .. } => "early_withdraw",
            Self::LockPermanent { .. } => "lock_permanent",
            Self::UnlockPermanent { .. } => "unlock_permanent",
            Self::Merge { .. } => "merge",
            Self::Split { .. } => "split",
            Self::Approve { .. } => "approve",
            Self::SetApprovalForAll { .. } => "set_approval_for_all",
            Self::Transfer { .. } => "transfer",
            Self::ToggleSplit { .. } => "toggle_split",
            Self::Notify { .. } => "notify",
            Self::GetReward { .. } => "get_reward",
            Self::EnableSelfRepay { .. } => "enable_self_repay",
            Self::DisableSelfRepay { .. } => "disable_self_repay",
            Self::Weight { .. } => "weight",
            Self::TotalWeight => "total_weight",
            Self::Earned { .. } => "earned",
            Self::Balance { .. } => "balance",
        }
    }
}

/// What a successful step produced.
#[derive(Serialize, Debug)]
#[serde(untagged)]
pub enum StepResult {
    Unit,
    Record(RecordId),
    Amount(u128),
    Progress(CheckpointProgress),
    End { end: u64 },
    Epoch { epoch: u64 },
    Withdrawal(Withdrawal),
    Reshape(Reshape),
    Payouts(Vec<RewardPayout>),
    Receivers(Vec<(RecordId, AccountId)>),
}

/// One output line.
#[derive(Serialize, Debug)]
pub struct Outcome {
    pub step: usize,
    pub at: u64,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a finished run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: usize,
    pub failed: usize,
    pub records: usize,
    pub total_locked: u128,
}

pub fn load(path: &Path) -> Result<Script> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid script: {}", path.display()))
}

/// Replay `script` against a fresh escrow, handing each outcome to `emit`.
pub fn run(script: &Script, config: EscrowConfig, mut emit: impl FnMut(Outcome)) -> Result<RunSummary> {
    let mut bank = MemoryBank::new();
    for f in &script.funding {
        bank.credit(f.asset, f.account, f.amount);
    }
    let mut escrow = Escrow::new(config, script.genesis, bank, MemoryResolver::new())
        .context("failed to create escrow")?;
    info!(genesis = script.genesis, steps = script.steps.len(), "replaying script");

    let mut failed = 0;
    for (index, step) in script.steps.iter().enumerate() {
        let op = step.op.name();
        let outcome = match apply(&mut escrow, &step.op, step.at) {
            Ok(result) => Outcome {
                step: index,
                at: step.at,
                op,
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                failed += 1;
                warn!(step = index, op, error = %e, "step failed");
                Outcome {
                    step: index,
                    at: step.at,
                    op,
                    ok: false,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        };
        emit(outcome);
    }

    Ok(RunSummary {
        steps: script.steps.len(),
        failed,
        records: escrow.records().count(),
        total_locked: escrow.total_locked(),
    })
}

fn apply(e: &mut ScriptEscrow, op: &Op, now: u64) -> Result<StepResult, EscrowError> {
    let result = match op.clone() {
        Op::Checkpoint => StepResult::Progress(e.checkpoint(now)?),
        Op::CreateLock { caller, amount, duration } => StepResult::Record(e.create_lock(caller, amount, duration, now)?),
        Op::CreateLockFor { caller, beneficiary, amount, duration } => {
            StepResult::Record(e.create_lock_for(caller, beneficiary, amount, duration, now)?)
        }
        Op::DepositFor { caller, id, amount } => {
            e.deposit_for(caller, id, amount, now)?;
            StepResult::Unit
        }
        Op::IncreaseAmount { caller, id, amount } => {
            e.increase_amount(caller, id, amount, now)?;
            StepResult::Unit
        }
        Op::IncreaseUnlockTime { caller, id, duration } => StepResult::End {
            end: e.increase_unlock_time(caller, id, duration, now)?,
        },
        Op::Withdraw { caller, id } => StepResult::Withdrawal(e.withdraw(caller, id, now)?),
        Op::EarlyWithdraw { caller, id } => StepResult::Withdrawal(e.early_withdraw(caller, id, now)?),
        Op::LockPermanent { caller, id } => {
            e.lock_permanent(caller, id, now)?;
            StepResult::Unit
        }
        Op::UnlockPermanent { caller, id } => StepResult::End {
            end: e.unlock_permanent(caller, id, now)?,
        },
        Op::Merge { caller, from, to } => StepResult::Reshape(e.merge(caller, from, to, now)?),
        Op::Split { caller, id, amount } => StepResult::Reshape(e.split(caller, id, amount, now)?),
        Op::Approve { caller, id, approved } => {
            e.approve(caller, id, approved)?;
            StepResult::Unit
        }
        Op::SetApprovalForAll { caller, operator, approved } => {
            e.set_approval_for_all(caller, operator, approved);
            StepResult::Unit
        }
        Op::Transfer { caller, id, to } => {
            e.transfer(caller, id, to, now)?;
            StepResult::Unit
        }
        Op::ToggleSplit { account, allowed } => {
            e.toggle_split_permission(account, allowed);
            StepResult::Unit
        }
        Op::Notify { caller, kinds, amounts } => StepResult::Epoch {
            epoch: e.notify_batch(caller, &kinds, &amounts, now)?,
        },
        Op::GetReward { caller, ids, kinds, until } => {
            let ts = until.unwrap_or(now);
            StepResult::Payouts(e.get_reward_until_ts_batch(caller, &ids, &kinds, ts, now)?)
        }
        Op::EnableSelfRepay { caller, ids } => StepResult::Receivers(e.enable_self_repay_loan_batch(caller, &ids, now)?),
        Op::DisableSelfRepay { caller, ids } => {
            e.disable_self_repay_loan_batch(caller, &ids, now)?;
            StepResult::Unit
        }
        Op::Weight { id } => {
            e.record(id)?;
            StepResult::Amount(e.weight_of(id, now))
        }
        Op::TotalWeight => StepResult::Amount(e.total_weight(now)?),
        Op::Earned { id, kind } => StepResult::Amount(e.earned(kind, id, now)?),
        Op::Balance { account, asset } => StepResult::Amount(e.bank().balance(asset, &account)),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use sluice_core::constants::{COIN, EPOCH_DURATION};

    const W: u64 = EPOCH_DURATION;
    const G: u64 = 2_800 * W;

    fn hex_of(seed: u8) -> String {
        AccountId([seed; 32]).to_string()
    }

    fn sample() -> String {
        let (a, d) = (hex_of(1), hex_of(0xD0));
        format!(
            r#"{{
              "genesis": {G},
              "funding": [
                {{ "account": "{a}", "asset": "Locked", "amount": {lock} }},
                {{ "account": "{d}", "asset": {{ "Reward": 1 }}, "amount": 1000 }}
              ],
              "steps": [
                {{ "at": {G}, "op": {{ "create_lock": {{ "caller": "{a}", "amount": {lock}, "duration": {W} }} }} }},
                {{ "at": {G}, "op": {{ "lock_permanent": {{ "caller": "{a}", "id": 1 }} }} }},
                {{ "at": {G}, "op": {{ "notify": {{ "caller": "{d}", "kinds": [1], "amounts": [1000] }} }} }},
                {{ "at": {G}, "op": {{ "withdraw": {{ "caller": "{a}", "id": 1 }} }} }},
                {{ "at": {next}, "op": {{ "get_reward": {{ "caller": "{a}", "ids": [1], "kinds": [1] }} }} }},
                {{ "at": {next}, "op": {{ "balance": {{ "account": "{a}", "asset": {{ "Reward": 1 }} }} }} }}
              ]
            }}"#,
            lock = 5 * COIN,
            next = G + W,
        )
    }

    fn distributor_config() -> EscrowConfig {
        EscrowConfig {
            distributors: vec![AccountId([0xD0; 32])],
            ..EscrowConfig::default()
        }
    }

    #[test]
    fn replays_sample_script() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(sample().as_bytes()).unwrap();
        let script = load(file.path()).unwrap();

        let mut lines: Vec<serde_json::Value> = Vec::new();
        let summary = run(&script, distributor_config(), |o| {
            lines.push(serde_json::to_value(&o).unwrap());
        })
        .unwrap();

        assert_eq!(summary.steps, 6);
        // Withdrawing a permanent record fails; everything else succeeds.
        assert_eq!(summary.failed, 1);
        assert_eq!(lines[3]["ok"], false);
        assert_eq!(lines[3]["op"], "withdraw");
        assert!(lines[3]["error"].as_str().unwrap().contains("permanent"));
        assert!(lines[1].get("result").is_some());
        assert_eq!(lines[0]["result"], 1);
        assert_eq!(lines[2]["result"]["epoch"], G + W);
        assert_eq!(lines[4]["result"][0]["amount"], 1000);
        assert_eq!(lines[5]["result"], 1000);
        assert_eq!(summary.total_locked, 5 * COIN);
    }

    #[test]
    fn rejects_unknown_op() {
        let text = format!(r#"{{ "genesis": {G}, "steps": [{{ "at": {G}, "op": {{ "explode": {{}} }} }}] }}"#);
        assert!(serde_json::from_str::<Script>(&text).is_err());
    }

    #[test]
    fn invalid_config_fails_the_run() {
        let script = Script {
            genesis: G,
            funding: Vec::new(),
            steps: Vec::new(),
        };
        let cfg = EscrowConfig {
            max_batch_size: 0,
            ..EscrowConfig::default()
        };
        assert!(run(&script, cfg, |_| {}).is_err());
    }
}
