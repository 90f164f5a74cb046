//! Matchmaking state machine.
//!
//! Users wait in arrival order. Two waiting users are paired into a
//! [`Proposal`] which both must accept before a game session is created.
//! A user is never both waiting and part of a proposal, and appears at most
//! once overall.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub id: Uuid,
    pub player_one: Uuid,
    pub player_two: Uuid,
    accepted: [bool; 2],
}

impl Proposal {
    fn new(player_one: Uuid, player_two: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            player_one,
            player_two,
            accepted: [false; 2],
        }
    }

    pub fn players(&self) -> [Uuid; 2] {
        [self.player_one, self.player_two]
    }

    pub fn has_player(&self, user_id: Uuid) -> bool {
        self.player_one == user_id || self.player_two == user_id
    }

    pub fn other(&self, user_id: Uuid) -> Uuid {
        if self.player_one == user_id { self.player_two } else { self.player_one }
    }

    pub fn has_accepted(&self, user_id: Uuid) -> bool {
        self.slot(user_id).is_some_and(|slot| self.accepted[slot])
    }

    fn slot(&self, user_id: Uuid) -> Option<usize> {
        if self.player_one == user_id {
            Some(0)
        } else if self.player_two == user_id {
            Some(1)
        } else {
            None
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Joined {
    Waiting,
    AlreadyQueued,
    Proposed(Proposal),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Responded {
    /// Unknown proposal, or the user is not part of it.
    Unknown,
    /// Accepted, still waiting on the other player.
    Pending,
    /// Both accepted. The proposal is gone from the queue.
    Matched(Proposal),
    /// The other player is back at the head of the line.
    Rejected { proposal: Proposal, requeued: Uuid },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Left {
    NotQueued,
    Waiting,
    /// The user walked out of a proposal; the other player is back in line.
    Proposal { proposal: Proposal, requeued: Uuid },
}

#[derive(Debug, PartialEq, Eq)]
pub struct Expired {
    pub proposal: Proposal,
    pub requeued: Vec<Uuid>,
    pub dropped: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    Idle,
    Waiting,
    Proposed(Uuid),
}

#[derive(Debug, Default)]
pub struct Queue {
    waiting: VecDeque<Uuid>,
    proposals: HashMap<Uuid, Proposal>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standing(&self, user_id: Uuid) -> Standing {
        if self.waiting.contains(&user_id) {
            return Standing::Waiting;
        }
        match self.proposal_of(user_id) {
            Some(proposal) => Standing::Proposed(proposal.id),
            None => Standing::Idle,
        }
    }

    pub fn proposal_of(&self, user_id: Uuid) -> Option<&Proposal> {
        self.proposals.values().find(|p| p.has_player(user_id))
    }

    #[cfg(test)]
    fn proposal(&self, proposal_id: Uuid) -> Option<&Proposal> {
        self.proposals.get(&proposal_id)
    }

    #[cfg(test)]
    fn waiting(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.waiting.iter().copied()
    }

    /// Pairs the entrant with the longest-waiting user, if any.
    pub fn join(&mut self, user_id: Uuid) -> Joined {
        if self.standing(user_id) != Standing::Idle {
            return Joined::AlreadyQueued;
        }

        match self.waiting.pop_front() {
            Some(oldest) => Joined::Proposed(self.propose(oldest, user_id)),
            None => {
                self.waiting.push_back(user_id);
                Joined::Waiting
            }
        }
    }

    pub fn respond(&mut self, user_id: Uuid, proposal_id: Uuid, accept: bool) -> Responded {
        let Some(proposal) = self.proposals.get_mut(&proposal_id) else {
            return Responded::Unknown;
        };
        let Some(slot) = proposal.slot(user_id) else {
            return Responded::Unknown;
        };

        if !accept {
            let Some(proposal) = self.proposals.remove(&proposal_id) else {
                return Responded::Unknown;
            };
            let requeued = proposal.other(user_id);
            self.waiting.push_front(requeued);
            return Responded::Rejected { proposal, requeued };
        }

        proposal.accepted[slot] = true;
        if proposal.accepted.iter().all(|accepted| *accepted) {
            match self.proposals.remove(&proposal_id) {
                Some(proposal) => Responded::Matched(proposal),
                None => Responded::Unknown,
            }
        } else {
            Responded::Pending
        }
    }

    pub fn leave(&mut self, user_id: Uuid) -> Left {
        if let Some(index) = self.waiting.iter().position(|id| *id == user_id) {
            self.waiting.remove(index);
            return Left::Waiting;
        }

        let Some(proposal_id) = self.proposal_of(user_id).map(|p| p.id) else {
            return Left::NotQueued;
        };
        match self.respond(user_id, proposal_id, false) {
            Responded::Rejected { proposal, requeued } => Left::Proposal { proposal, requeued },
            _ => Left::NotQueued,
        }
    }

    /// Drops an unanswered proposal. Players who had accepted go back to the
    /// head of the line, the silent ones leave the queue.
    pub fn expire(&mut self, proposal_id: Uuid) -> Option<Expired> {
        let proposal = self.proposals.remove(&proposal_id)?;

        let (requeued, dropped): (Vec<Uuid>, Vec<Uuid>) = proposal
            .players()
            .into_iter()
            .partition(|user_id| proposal.has_accepted(*user_id));
        for user_id in requeued.iter().rev() {
            self.waiting.push_front(*user_id);
        }

        Some(Expired { proposal, requeued, dropped })
    }

    /// Pairs the two longest-waiting users, if there are two.
    pub fn pair_waiting(&mut self) -> Option<Proposal> {
        if self.waiting.len() < 2 {
            return None;
        }
        let player_one = self.waiting.pop_front()?;
        let player_two = self.waiting.pop_front()?;
        Some(self.propose(player_one, player_two))
    }

    fn propose(&mut self, player_one: Uuid, player_two: Uuid) -> Proposal {
        let proposal = Proposal::new(player_one, player_two);
        self.proposals.insert(proposal.id, proposal.clone());
        proposal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users<const N: usize>() -> [Uuid; N] {
        std::array::from_fn(|_| Uuid::now_v7())
    }

    fn proposed(joined: Joined) -> Proposal {
        match joined {
            Joined::Proposed(proposal) => proposal,
            other => panic!("expected a proposal, got {other:?}"),
        }
    }

    #[test]
    fn first_user_waits_second_gets_paired() {
        let mut queue = Queue::new();
        let [ada, bob] = users();

        assert_eq!(queue.join(ada), Joined::Waiting);
        assert_eq!(queue.standing(ada), Standing::Waiting);

        let proposal = proposed(queue.join(bob));
        assert_eq!(proposal.player_one, ada);
        assert_eq!(proposal.player_two, bob);
        assert_eq!(queue.standing(ada), Standing::Proposed(proposal.id));
        assert_eq!(queue.standing(bob), Standing::Proposed(proposal.id));
        assert_eq!(queue.waiting().count(), 0);
    }

    #[test]
    fn joining_twice_is_refused() {
        let mut queue = Queue::new();
        let [ada, bob] = users();

        queue.join(ada);
        assert_eq!(queue.join(ada), Joined::AlreadyQueued);

        proposed(queue.join(bob));
        assert_eq!(queue.join(ada), Joined::AlreadyQueued);
        assert_eq!(queue.join(bob), Joined::AlreadyQueued);
    }

    #[test]
    fn oldest_waiter_is_paired_first() {
        let mut queue = Queue::new();
        let [ada, bob, cy, dee] = users();

        queue.join(ada);
        let first = proposed(queue.join(bob));
        queue.join(cy);
        let second = proposed(queue.join(dee));

        assert_eq!(first.players(), [ada, bob]);
        assert_eq!(second.players(), [cy, dee]);
    }

    #[test]
    fn both_accepts_make_a_match() {
        let mut queue = Queue::new();
        let [ada, bob] = users();
        queue.join(ada);
        let proposal = proposed(queue.join(bob));

        assert_eq!(queue.respond(bob, proposal.id, true), Responded::Pending);
        // accepting twice changes nothing
        assert_eq!(queue.respond(bob, proposal.id, true), Responded::Pending);

        match queue.respond(ada, proposal.id, true) {
            Responded::Matched(matched) => assert_eq!(matched.id, proposal.id),
            other => panic!("expected a match, got {other:?}"),
        }
        assert_eq!(queue.standing(ada), Standing::Idle);
        assert_eq!(queue.standing(bob), Standing::Idle);
        assert!(queue.proposal(proposal.id).is_none());
    }

    #[test]
    fn reject_requeues_the_other_player_at_the_head() {
        let mut queue = Queue::new();
        let [ada, bob, cy] = users();
        queue.join(ada);
        let proposal = proposed(queue.join(bob));
        queue.join(cy);

        assert_eq!(queue.respond(ada, proposal.id, true), Responded::Pending);
        let responded = queue.respond(bob, proposal.id, false);
        assert!(matches!(responded, Responded::Rejected { requeued, .. } if requeued == ada));

        assert_eq!(queue.standing(bob), Standing::Idle);
        assert_eq!(queue.waiting().collect::<Vec<_>>(), vec![ada, cy]);

        let next = queue.pair_waiting().unwrap();
        assert_eq!(next.players(), [ada, cy]);
        assert!(queue.pair_waiting().is_none());
    }

    #[test]
    fn outsiders_cannot_answer() {
        let mut queue = Queue::new();
        let [ada, bob, eve] = users();
        queue.join(ada);
        let proposal = proposed(queue.join(bob));

        assert_eq!(queue.respond(eve, proposal.id, false), Responded::Unknown);
        assert_eq!(queue.respond(ada, Uuid::now_v7(), true), Responded::Unknown);
        assert!(queue.proposal(proposal.id).is_some());
    }

    #[test]
    fn leaving_while_waiting_or_proposed() {
        let mut queue = Queue::new();
        let [ada, bob, cy] = users();

        assert_eq!(queue.leave(ada), Left::NotQueued);
        queue.join(ada);
        assert_eq!(queue.leave(ada), Left::Waiting);
        assert_eq!(queue.standing(ada), Standing::Idle);

        queue.join(bob);
        let proposal = proposed(queue.join(cy));
        match queue.leave(cy) {
            Left::Proposal { proposal: left, requeued } => {
                assert_eq!(left.id, proposal.id);
                assert_eq!(requeued, bob);
            }
            other => panic!("expected to leave a proposal, got {other:?}"),
        }
        assert_eq!(queue.standing(bob), Standing::Waiting);
        assert_eq!(queue.standing(cy), Standing::Idle);
    }

    #[test]
    fn expiry_keeps_only_players_who_accepted() {
        let mut queue = Queue::new();
        let [ada, bob] = users();
        queue.join(ada);
        let proposal = proposed(queue.join(bob));
        queue.respond(bob, proposal.id, true);

        let expired = queue.expire(proposal.id).unwrap();
        assert_eq!(expired.requeued, vec![bob]);
        assert_eq!(expired.dropped, vec![ada]);
        assert_eq!(queue.standing(bob), Standing::Waiting);
        assert_eq!(queue.standing(ada), Standing::Idle);

        assert!(queue.expire(proposal.id).is_none());
    }

    #[test]
    fn answered_proposals_cannot_expire() {
        let mut queue = Queue::new();
        let [ada, bob] = users();
        queue.join(ada);
        let proposal = proposed(queue.join(bob));
        queue.respond(ada, proposal.id, true);
        queue.respond(bob, proposal.id, true);

        assert!(queue.expire(proposal.id).is_none());
    }
}
