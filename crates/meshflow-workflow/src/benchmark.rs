//! Tower-of-Hanoi benchmark for long sequential pipelines.
//!
//! The canonical minimal solution for `n` discs has `2^n - 1` moves and every
//! move is checkable against the stacking rule, which makes it a cheap source
//! of ground truth for "did the engine execute a very long workflow, in
//! order, without losing or repeating a step".

use crate::definition::{StepContext, StepFn, WorkflowDefinition, WorkflowStepDefinition, WorkflowStepResult};
use crate::engine::{CheckpointRetention, WorkflowEngine};
use crate::retry::RetryPolicy;
use futures_util::future::BoxFuture;
use meshflow_checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use meshflow_core::{MeshflowError, MeshflowResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Largest disc count accepted by the benchmark (33,554,431 moves).
pub const MAX_HANOI_DISCS: u32 = 25;

const BENCHMARK_NAME: &str = "TowerOfHanoi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Peg {
    A,
    B,
    C,
}

impl Peg {
    fn from_index(index: u64) -> Self {
        match index % 3 {
            0 => Peg::A,
            1 => Peg::B,
            _ => Peg::C,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Peg::A => 0,
            Peg::B => 1,
            Peg::C => 2,
        }
    }
}

impl std::fmt::Display for Peg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Peg::A => write!(f, "A"),
            Peg::B => write!(f, "B"),
            Peg::C => write!(f, "C"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HanoiMove {
    pub move_number: u64,
    pub disc: u32,
    pub from: Peg,
    pub to: Peg,
}

/// Number of moves in the minimal solution.
pub fn total_moves(discs: u32) -> u64 {
    (1u64 << discs) - 1
}

fn validate_discs(discs: u32) -> MeshflowResult<()> {
    if !(1..=MAX_HANOI_DISCS).contains(&discs) {
        return Err(MeshflowError::Validation(format!(
            "disc count must be between 1 and {MAX_HANOI_DISCS}, got {discs}"
        )));
    }
    Ok(())
}

/// Move `move_number` (1-based, at most `2^discs - 1`) of the minimal
/// solution moving all discs from peg A to peg C.
pub fn hanoi_move(discs: u32, move_number: u64) -> MeshflowResult<HanoiMove> {
    validate_discs(discs)?;
    let total = total_moves(discs);
    if !(1..=total).contains(&move_number) {
        return Err(MeshflowError::Validation(format!(
            "move number must be between 1 and {total} for {discs} discs, got {move_number}"
        )));
    }
    Ok(canonical_move(discs, move_number))
}

/// Closed form for a move already known to be in range.
///
/// Disc `k` moves on the moves whose lowest set bit is bit `k - 1`. The peg
/// arithmetic below produces a tower ending on B for even disc counts, so
/// B and C are swapped in that case.
fn canonical_move(discs: u32, move_number: u64) -> HanoiMove {
    debug_assert!(move_number >= 1);
    let m = move_number;
    let mut from = (m & (m - 1)) % 3;
    let mut to = ((m | (m - 1)) + 1) % 3;
    if discs % 2 == 0 {
        let swap = |p: u64| match p {
            1 => 2,
            2 => 1,
            other => other,
        };
        from = swap(from);
        to = swap(to);
    }
    HanoiMove {
        move_number,
        disc: m.trailing_zeros() + 1,
        from: Peg::from_index(from),
        to: Peg::from_index(to),
    }
}

/// The full canonical move sequence for `discs` discs.
pub fn generate_hanoi_moves(discs: u32) -> MeshflowResult<Vec<HanoiMove>> {
    validate_discs(discs)?;
    Ok((1..=total_moves(discs))
        .map(|m| canonical_move(discs, m))
        .collect())
}

/// Three pegs holding discs, largest at the bottom.
#[derive(Debug, Clone)]
pub struct PegBoard {
    pegs: [Vec<u32>; 3],
    discs: u32,
}

impl PegBoard {
    /// All discs stacked on peg A.
    pub fn new(discs: u32) -> Self {
        Self {
            pegs: [(1..=discs).rev().collect(), Vec::new(), Vec::new()],
            discs,
        }
    }

    /// Apply a move, refusing anything that breaks the stacking rule.
    pub fn apply(&mut self, mv: &HanoiMove) -> Result<(), String> {
        let (from, to) = (mv.from.index(), mv.to.index());
        match self.pegs[from].last() {
            Some(&top) if top == mv.disc => {}
            Some(&top) => {
                return Err(format!(
                    "move {}: disc {} is not on top of peg {} (found {top})",
                    mv.move_number, mv.disc, mv.from
                ))
            }
            None => {
                return Err(format!(
                    "move {}: peg {} is empty",
                    mv.move_number, mv.from
                ))
            }
        }
        if let Some(&top) = self.pegs[to].last() {
            if top < mv.disc {
                return Err(format!(
                    "move {}: disc {} cannot go onto smaller disc {top} on peg {}",
                    mv.move_number, mv.disc, mv.to
                ));
            }
        }
        self.pegs[from].pop();
        self.pegs[to].push(mv.disc);
        Ok(())
    }

    /// Every disc is on peg C in order.
    pub fn is_solved(&self) -> bool {
        self.pegs[0].is_empty()
            && self.pegs[1].is_empty()
            && self.pegs[2].iter().copied().eq((1..=self.discs).rev())
    }
}

/// Outcome of a single benchmark size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub benchmark_name: String,
    pub num_discs: u32,
    pub success: bool,
    pub total_steps_required: u64,
    pub steps_completed: u64,
    pub steps_failed: u64,
    pub checkpoints_created: u64,
    pub maker_score: f64,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressiveBenchmarkResult {
    pub max_discs_completed: u32,
    pub max_steps_completed: u64,
    pub results: Vec<BenchmarkResult>,
    pub overall_maker_score: f64,
    pub summary: String,
}

/// Completion ratio times disc count, scaled by 10 and rounded to 2 decimals.
pub fn maker_score(discs: u32, steps_completed: u64, total_steps: u64) -> f64 {
    if total_steps == 0 {
        return 0.0;
    }
    let ratio = steps_completed as f64 / total_steps as f64;
    (ratio * f64::from(discs) * 10.0 * 100.0).round() / 100.0
}

/// Drives Hanoi workflows through a [`WorkflowEngine`].
pub struct HanoiBenchmark {
    engine: WorkflowEngine,
}

impl HanoiBenchmark {
    /// Benchmark over the given store. Run results keep only checkpoint
    /// counts so memory stays flat for large disc counts.
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        let engine = WorkflowEngine::new(store)
            .with_retry_policy(RetryPolicy::none())
            .with_retention(CheckpointRetention::CountOnly);
        Self { engine }
    }

    /// Benchmark over an in-memory store that keeps a short tail per run.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCheckpointStore::new().with_history_limit(16)))
    }

    /// One step per move; each step replays its move on a shared board and
    /// fails if the move is illegal.
    pub fn build_workflow(discs: u32) -> MeshflowResult<(WorkflowDefinition, Arc<Mutex<PegBoard>>)> {
        validate_discs(discs)?;
        let board = Arc::new(Mutex::new(PegBoard::new(discs)));

        let shared = Arc::clone(&board);
        let execute: StepFn = Arc::new(
            move |ctx: StepContext,
                  _cancel: CancellationToken|
                  -> BoxFuture<'static, MeshflowResult<WorkflowStepResult>> {
                let mv = canonical_move(discs, u64::from(ctx.step_number).max(1));
                let applied = shared.lock().apply(&mv);
                Box::pin(async move {
                    Ok(match applied {
                        Ok(()) => WorkflowStepResult::ok()
                            .with_state("move", mv.move_number.into())
                            .with_state("disc", mv.disc.into())
                            .with_state("from", mv.from.to_string().into())
                            .with_state("to", mv.to.to_string().into()),
                        Err(reason) => WorkflowStepResult::failure(reason),
                    })
                })
            },
        );

        let name: Arc<str> = Arc::from("hanoi-move");
        let total = total_moves(discs);
        let mut definition = WorkflowDefinition::new(format!("hanoi-{discs}"))
            .with_max_retry(0)
            .pre_approved(true);
        definition.steps.reserve_exact(total as usize);
        for m in 1..=total {
            // total <= 2^25 - 1, so step numbers fit in u32.
            definition.push_step(
                WorkflowStepDefinition::from_fn(m as u32, Arc::clone(&name), Arc::clone(&execute))
                    .with_governance_check(false),
            );
        }
        Ok((definition, board))
    }

    pub async fn run_tower_of_hanoi(
        &self,
        discs: u32,
        cancel: &CancellationToken,
    ) -> MeshflowResult<BenchmarkResult> {
        let (definition, board) = Self::build_workflow(discs)?;
        let total = total_moves(discs);
        let start = Instant::now();

        info!(discs, total_steps = total, "Starting Tower of Hanoi benchmark");
        let run = self.engine.execute_workflow(&definition, cancel).await?;
        drop(definition);

        let solved = board.lock().is_solved();
        let steps_completed = run.completed_steps as u64;
        let success = run.success && solved && steps_completed == total;
        let error = match (&run.error, success) {
            (Some(e), _) => Some(e.clone()),
            (None, false) => Some("final peg state does not match the solved tower".to_string()),
            (None, true) => None,
        };

        let result = BenchmarkResult {
            benchmark_name: BENCHMARK_NAME.to_string(),
            num_discs: discs,
            success,
            total_steps_required: total,
            steps_completed,
            steps_failed: run.steps_failed as u64,
            checkpoints_created: run.checkpoints_created as u64,
            maker_score: maker_score(discs, steps_completed, total),
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        };
        info!(
            discs,
            success = result.success,
            steps_completed = result.steps_completed,
            maker_score = result.maker_score,
            duration_ms = result.duration_ms,
            "Tower of Hanoi benchmark finished"
        );
        Ok(result)
    }

    /// Run 1..=max_discs in order, stopping at the first failed size.
    pub async fn run_progressive_benchmark(
        &self,
        max_discs: u32,
        cancel: &CancellationToken,
    ) -> MeshflowResult<ProgressiveBenchmarkResult> {
        validate_discs(max_discs)?;

        let mut results = Vec::new();
        let mut max_discs_completed = 0;
        let mut max_steps_completed = 0;
        let mut overall_maker_score: f64 = 0.0;

        for discs in 1..=max_discs {
            let result = self.run_tower_of_hanoi(discs, cancel).await?;
            let success = result.success;
            if success {
                max_discs_completed = discs;
                max_steps_completed = max_steps_completed.max(result.steps_completed);
                overall_maker_score = overall_maker_score.max(result.maker_score);
            }
            results.push(result);
            if !success {
                break;
            }
        }

        let summary = format!(
            "Tower of Hanoi progressive benchmark: {max_discs_completed}/{max_discs} disc levels \
             completed, longest run {max_steps_completed} steps, overall MAKER score {overall_maker_score:.2}"
        );
        info!(%summary, "Progressive benchmark finished");

        Ok(ProgressiveBenchmarkResult {
            max_discs_completed,
            max_steps_completed,
            results,
            overall_maker_score,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulate(discs: u32, moves: &[HanoiMove]) -> PegBoard {
        let mut board = PegBoard::new(discs);
        for mv in moves {
            board.apply(mv).unwrap();
        }
        board
    }

    #[test]
    fn test_move_counts_and_legality() {
        for discs in 1..=14 {
            let moves = generate_hanoi_moves(discs).unwrap();
            assert_eq!(moves.len() as u64, (1u64 << discs) - 1);
            assert!(simulate(discs, &moves).is_solved(), "{discs} discs");
        }
    }

    #[test]
    fn test_legality_at_upper_range() {
        // Streamed so the largest sizes do not hold every move in memory.
        for discs in [20, MAX_HANOI_DISCS] {
            let mut board = PegBoard::new(discs);
            for m in 1..=total_moves(discs) {
                board.apply(&canonical_move(discs, m)).unwrap();
            }
            assert!(board.is_solved(), "{discs} discs");
        }
    }

    #[test]
    fn test_hanoi_move_checks_range() {
        assert!(hanoi_move(3, 0).is_err());
        assert!(hanoi_move(3, 8).is_err());
        assert!(hanoi_move(0, 1).is_err());
        let middle = hanoi_move(3, 4).unwrap();
        assert_eq!((middle.disc, middle.from, middle.to), (3, Peg::A, Peg::C));
        let last = hanoi_move(MAX_HANOI_DISCS, total_moves(MAX_HANOI_DISCS)).unwrap();
        assert_eq!(last.disc, 1);
        assert_eq!(last.to, Peg::C);
    }

    #[test]
    fn test_three_disc_sequence() {
        let moves = generate_hanoi_moves(3).unwrap();
        let pairs: Vec<(u32, Peg, Peg)> = moves.iter().map(|m| (m.disc, m.from, m.to)).collect();
        assert_eq!(
            pairs,
            vec![
                (1, Peg::A, Peg::C),
                (2, Peg::A, Peg::B),
                (1, Peg::C, Peg::B),
                (3, Peg::A, Peg::C),
                (1, Peg::B, Peg::A),
                (2, Peg::B, Peg::C),
                (1, Peg::A, Peg::C),
            ]
        );
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate_hanoi_moves(8).unwrap(), generate_hanoi_moves(8).unwrap());
    }

    #[test]
    fn test_disc_bounds() {
        assert!(generate_hanoi_moves(0).is_err());
        assert!(generate_hanoi_moves(26).is_err());
        assert_eq!(total_moves(MAX_HANOI_DISCS), 33_554_431);
    }

    #[test]
    fn test_board_rejects_illegal_move() {
        let mut board = PegBoard::new(2);
        let illegal = HanoiMove {
            move_number: 1,
            disc: 2,
            from: Peg::A,
            to: Peg::C,
        };
        assert!(board.apply(&illegal).unwrap_err().contains("not on top"));

        board
            .apply(&HanoiMove {
                move_number: 1,
                disc: 1,
                from: Peg::A,
                to: Peg::B,
            })
            .unwrap();
        let onto_smaller = HanoiMove {
            move_number: 2,
            disc: 2,
            from: Peg::A,
            to: Peg::B,
        };
        assert!(board.apply(&onto_smaller).unwrap_err().contains("smaller disc"));
    }

    #[test]
    fn test_maker_score() {
        assert_eq!(maker_score(10, 1023, 1023), 100.0);
        assert_eq!(maker_score(4, 0, 15), 0.0);
        assert_eq!(maker_score(2, 1, 3), 6.67);
    }

    #[tokio::test]
    async fn test_out_of_range_discs_rejected() {
        let bench = HanoiBenchmark::in_memory();
        let err = bench
            .run_tower_of_hanoi(0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MeshflowError::Validation(_)));
    }
}
