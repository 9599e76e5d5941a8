// packages/backend/src/leaderboard.rs
//! Per-respondent emoji counters and the bounded high-score table.
//!
//! The table is a min-heap of at most `capacity` entries whose root is the
//! weakest tracked score, plus an index from respondent to heap slot so an
//! update for a tracked player is an O(log k) sift instead of a scan.
//! Ties go to whoever reached the score first.

use crate::config::LEADERBOARD_SIZE;
use crate::types::{
    LeaderboardAction, LeaderboardEntry, LeaderboardSnapshot, PlayerScore, RespondentId,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Tracked {
    respondent: RespondentId,
    score: u64,
    /// Sequence number of the update that brought the player to `score`.
    reached_at: u64,
}

impl Tracked {
    /// True when `self` ranks strictly below `other`.
    fn weaker_than(&self, other: &Tracked) -> bool {
        self.score < other.score || (self.score == other.score && self.reached_at > other.reached_at)
    }
}

struct TopScores {
    heap: Vec<Tracked>,
    positions: HashMap<RespondentId, usize>,
    capacity: usize,
}

impl TopScores {
    fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity + 1),
            positions: HashMap::with_capacity(capacity + 1),
            capacity,
        }
    }

    fn offer(&mut self, respondent: &RespondentId, score: u64, seq: u64) {
        if let Some(&pos) = self.positions.get(respondent) {
            let entry = &mut self.heap[pos];
            if score > entry.score {
                entry.score = score;
                entry.reached_at = seq;
                // got stronger: may need to move away from the root
                self.sift_down(pos);
            }
            return;
        }

        let candidate = Tracked {
            respondent: respondent.clone(),
            score,
            reached_at: seq,
        };

        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
            let last = self.heap.len() - 1;
            self.positions.insert(respondent.clone(), last);
            self.sift_up(last);
        } else if self.heap.first().is_some_and(|min| score > min.score) {
            self.heap.push(candidate);
            let last = self.heap.len() - 1;
            self.positions.insert(respondent.clone(), last);
            self.sift_up(last);
            self.pop_min();
        }
    }

    fn pop_min(&mut self) {
        if self.heap.is_empty() {
            return;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        if let Some(evicted) = self.heap.pop() {
            self.positions.remove(&evicted.respondent);
        }
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].weaker_than(&self.heap[parent]) {
                self.swap(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut weakest = pos;
            if left < len && self.heap[left].weaker_than(&self.heap[weakest]) {
                weakest = left;
            }
            if right < len && self.heap[right].weaker_than(&self.heap[weakest]) {
                weakest = right;
            }
            if weakest == pos {
                break;
            }
            self.swap(pos, weakest);
            pos = weakest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].respondent.clone(), a);
        self.positions.insert(self.heap[b].respondent.clone(), b);
    }

    fn ranked(&self) -> Vec<LeaderboardEntry> {
        let mut sorted = self.heap.clone();
        sorted.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.reached_at.cmp(&b.reached_at))
        });
        sorted
            .into_iter()
            .enumerate()
            .map(|(i, t)| LeaderboardEntry {
                user_id: t.respondent,
                score: t.score,
                rank: i + 1,
            })
            .collect()
    }
}

struct Board {
    players: HashMap<RespondentId, PlayerScore>,
    top: TopScores,
    seq: u64,
}

impl Board {
    fn new(capacity: usize) -> Self {
        Self {
            players: HashMap::new(),
            top: TopScores::new(capacity),
            seq: 0,
        }
    }
}

pub struct Leaderboard {
    board: RwLock<Board>,
    capacity: usize,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::with_capacity(LEADERBOARD_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            board: RwLock::new(Board::new(capacity)),
            capacity,
        }
    }

    pub async fn record(&self, respondent: &RespondentId, action: LeaderboardAction) {
        let mut board = self.board.write().await;
        board.seq += 1;
        let seq = board.seq;

        let player = board
            .players
            .entry(respondent.clone())
            .or_insert_with(|| PlayerScore::zeroed(respondent.clone()));
        match action {
            LeaderboardAction::Spawn => player.spawned_count += 1,
            LeaderboardAction::Pop => {
                player.popped_count += 1;
                let score = player.popped_count;
                board.top.offer(respondent, score, seq);
            }
        }
    }

    /// The caller's own counters plus the ranked table. Never mutates the heap.
    pub async fn snapshot(&self, respondent: &RespondentId) -> LeaderboardSnapshot {
        let board = self.board.read().await;
        let player_score = board
            .players
            .get(respondent)
            .cloned()
            .unwrap_or_else(|| PlayerScore::zeroed(respondent.clone()));
        LeaderboardSnapshot {
            player_score,
            top_scores: board.top.ranked(),
        }
    }

    pub async fn reset(&self) {
        *self.board.write().await = Board::new(self.capacity);
    }
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn rid(i: usize) -> RespondentId {
        RespondentId::new(format!("u{i}"))
    }

    async fn pop_n(board: &Leaderboard, who: &RespondentId, n: usize) {
        for _ in 0..n {
            board.record(who, LeaderboardAction::Pop).await;
        }
    }

    #[tokio::test]
    async fn test_fifteen_players_keep_top_ten() {
        let board = Leaderboard::new();
        for i in 1..=15 {
            pop_n(&board, &rid(i), i).await;
        }

        let snap = board.snapshot(&rid(1)).await;
        assert_eq!(snap.player_score.popped_count, 1);
        assert_eq!(snap.top_scores.len(), 10);
        for (i, entry) in snap.top_scores.iter().enumerate() {
            assert_eq!(entry.rank, i + 1);
            assert_eq!(entry.score, 15 - i as u64);
            assert_eq!(entry.user_id, rid(15 - i));
        }
    }

    #[tokio::test]
    async fn test_spawn_counts_without_ranking() {
        let board = Leaderboard::new();
        let u = rid(1);
        board.record(&u, LeaderboardAction::Spawn).await;
        board.record(&u, LeaderboardAction::Spawn).await;

        let snap = board.snapshot(&u).await;
        assert_eq!(snap.player_score.spawned_count, 2);
        assert_eq!(snap.player_score.popped_count, 0);
        assert!(snap.top_scores.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_player_gets_zeroed_score() {
        let board = Leaderboard::new();
        let snap = board.snapshot(&rid(42)).await;
        assert_eq!(snap.player_score, PlayerScore::zeroed(rid(42)));
    }

    #[tokio::test]
    async fn test_ties_keep_first_arrival() {
        let board = Leaderboard::with_capacity(2);
        pop_n(&board, &rid(1), 3).await;
        pop_n(&board, &rid(2), 3).await;
        // equal score, later arrival: not admitted
        pop_n(&board, &rid(3), 3).await;

        let snap = board.snapshot(&rid(3)).await;
        let ids: Vec<_> = snap.top_scores.iter().map(|e| e.user_id.clone()).collect();
        assert_eq!(ids, vec![rid(1), rid(2)]);

        // one more pop beats the weakest and evicts the later of the tied pair
        board.record(&rid(3), LeaderboardAction::Pop).await;
        let snap = board.snapshot(&rid(3)).await;
        let ids: Vec<_> = snap.top_scores.iter().map(|e| e.user_id.clone()).collect();
        assert_eq!(ids, vec![rid(3), rid(1)]);
    }

    #[tokio::test]
    async fn test_tracked_player_update_reorders() {
        let board = Leaderboard::with_capacity(3);
        pop_n(&board, &rid(1), 1).await;
        pop_n(&board, &rid(2), 2).await;
        pop_n(&board, &rid(3), 3).await;
        pop_n(&board, &rid(1), 4).await;

        let snap = board.snapshot(&rid(1)).await;
        let scores: Vec<_> = snap
            .top_scores
            .iter()
            .map(|e| (e.user_id.clone(), e.score))
            .collect();
        assert_eq!(scores, vec![(rid(1), 5), (rid(3), 3), (rid(2), 2)]);
    }

    #[tokio::test]
    async fn test_matches_brute_force_ranking() {
        let board = Leaderboard::new();
        let mut counts = vec![0u64; 25];
        // uneven, deterministic pop order
        for i in 0..400usize {
            let x = (i * i + 3 * i) % 25;
            counts[x] += 1;
            board.record(&rid(x), LeaderboardAction::Pop).await;
        }

        let snap = board.snapshot(&rid(0)).await;
        assert_eq!(snap.top_scores.len(), 10);

        let mut expected: Vec<u64> = counts.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        let got: Vec<u64> = snap.top_scores.iter().map(|e| e.score).collect();
        assert_eq!(got, expected[..10].to_vec());

        for entry in &snap.top_scores {
            let idx: usize = entry.user_id.as_str()[1..].parse().unwrap();
            assert_eq!(counts[idx], entry.score);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records() {
        let board = Arc::new(Leaderboard::new());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let board = board.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..=i {
                    board.record(&rid(i), LeaderboardAction::Pop).await;
                    board.record(&rid(i), LeaderboardAction::Spawn).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snap = board.snapshot(&rid(19)).await;
        assert_eq!(snap.player_score.popped_count, 20);
        assert_eq!(snap.player_score.spawned_count, 20);
        let scores: Vec<u64> = snap.top_scores.iter().map(|e| e.score).collect();
        assert_eq!(scores, (11..=20).rev().collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_reset_zeroes_everything() {
        let board = Leaderboard::new();
        pop_n(&board, &rid(1), 5).await;
        board.reset().await;

        let snap = board.snapshot(&rid(1)).await;
        assert_eq!(snap.player_score.popped_count, 0);
        assert!(snap.top_scores.is_empty());
    }
}
