pub mod queue;
mod status;

use std::{sync::Arc, time::Duration};

use axum::{routing::get, Router};
use futures_util::future::BoxFuture;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    events::{Hub, PlayerRef, ServerEvent},
    game::{session, LiveGames},
    users, AppResult, AppState, Reject,
};

use queue::{Expired, Joined, Left, Proposal, Queue, Responded, Standing};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user-status/{id}", get(status::user_status))
        .route("/match/{id}", get(status::match_status))
}

/// Queue plus the side effects of its transitions: socket events, the
/// proposal timeout and the game session once both players accept.
#[derive(Clone)]
pub struct Matchmaking {
    queue: Arc<Mutex<Queue>>,
    db_pool: SqlitePool,
    hub: Hub,
    live: LiveGames,
    proposal_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetails {
    pub id: Uuid,
    pub player_one: PlayerRef,
    pub player_two: PlayerRef,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatus {
    pub in_match: bool,
    pub match_details: Option<MatchDetails>,
}

impl Matchmaking {
    pub fn new(db_pool: SqlitePool, hub: Hub, live: LiveGames, proposal_timeout: Duration) -> Self {
        Self {
            queue: Arc::default(),
            db_pool,
            hub,
            live,
            proposal_timeout,
        }
    }

    pub async fn standing(&self, user_id: Uuid) -> Standing {
        self.queue.lock().await.standing(user_id)
    }

    pub async fn join(&self, user_id: Uuid) -> AppResult<()> {
        let joined = self.queue.lock().await.join(user_id);
        match joined {
            Joined::Waiting => {
                info!("{user_id} is waiting for an opponent");
                Ok(())
            }
            Joined::AlreadyQueued => Err(Reject::Conflict("already in the queue"))?,
            Joined::Proposed(proposal) => self.propose(proposal).await,
        }
    }

    pub async fn respond(&self, user_id: Uuid, proposal_id: Uuid, accept: bool) -> AppResult<()> {
        let responded = self.queue.lock().await.respond(user_id, proposal_id, accept);
        match responded {
            Responded::Unknown => Err(Reject::NotFound("match proposal"))?,
            Responded::Pending => {
                debug!("{user_id} accepted {proposal_id}, waiting on the other player");
                Ok(())
            }
            Responded::Matched(proposal) => self.start(proposal).await,
            Responded::Rejected { requeued, .. } => {
                info!("{user_id} rejected {proposal_id}");
                self.hub.emit(user_id, ServerEvent::LeftQueue).await;
                self.requeued(&[requeued]).await
            }
        }
    }

    pub async fn leave(&self, user_id: Uuid) -> AppResult<()> {
        let left = self.queue.lock().await.leave(user_id);
        match left {
            Left::NotQueued => {}
            Left::Waiting => info!("{user_id} left the queue"),
            Left::Proposal { proposal, requeued } => {
                info!("{user_id} left the queue, dropping {}", proposal.id);
                self.requeued(&[requeued]).await?;
            }
        }
        self.hub.emit(user_id, ServerEvent::LeftQueue).await;
        Ok(())
    }

    /// Drops a proposal nobody finished answering in time.
    pub async fn expire(&self, proposal_id: Uuid) -> AppResult<()> {
        let expired = self.queue.lock().await.expire(proposal_id);
        let Some(Expired { proposal, requeued, dropped }) = expired else {
            return Ok(());
        };

        info!("match proposal {} expired", proposal.id);
        for user_id in dropped {
            self.hub.emit(user_id, ServerEvent::LeftQueue).await;
        }
        self.requeued(&requeued).await
    }

    pub async fn match_status(&self, user_id: Uuid) -> AppResult<MatchStatus> {
        let proposal = self.queue.lock().await.proposal_of(user_id).cloned();
        if let Some(proposal) = proposal {
            let (player_one, player_two) = self.player_refs(&proposal).await?;
            return Ok(MatchStatus {
                in_match: true,
                match_details: Some(MatchDetails { id: proposal.id, player_one, player_two, accepted: false }),
            });
        }

        let Some(game) = session::get_active_game(&self.db_pool, user_id).await? else {
            return Ok(MatchStatus { in_match: false, match_details: None });
        };
        let player_one = self.player_ref(game.player_one_id).await?;
        let player_two = self.player_ref(game.player_two_id).await?;
        Ok(MatchStatus {
            in_match: true,
            match_details: Some(MatchDetails { id: game.id, player_one, player_two, accepted: true }),
        })
    }

    async fn requeued(&self, user_ids: &[Uuid]) -> AppResult<()> {
        for user_id in user_ids {
            self.hub.emit(*user_id, ServerEvent::RemainInQueue).await;
        }
        self.pair_waiting().await
    }

    async fn pair_waiting(&self) -> AppResult<()> {
        loop {
            let proposal = self.queue.lock().await.pair_waiting();
            match proposal {
                Some(proposal) => self.propose(proposal).await?,
                None => return Ok(()),
            }
        }
    }

    async fn propose(&self, proposal: Proposal) -> AppResult<()> {
        info!("proposing {} vs {} as {}", proposal.player_one, proposal.player_two, proposal.id);
        let (player_one, player_two) = self.player_refs(&proposal).await?;
        self.hub.emit_all(&proposal.players(), ServerEvent::MatchProposal {
            id: proposal.id,
            player_one,
            player_two,
        }).await;

        tokio::spawn(self.expire_later(proposal.id));
        Ok(())
    }

    // Boxed so the timeout task does not make `propose` a recursive future.
    fn expire_later(&self, proposal_id: Uuid) -> BoxFuture<'static, ()> {
        let matchmaking = self.clone();
        Box::pin(async move {
            tokio::time::sleep(matchmaking.proposal_timeout).await;
            if let Err(e) = matchmaking.expire(proposal_id).await {
                warn!("failed to expire {proposal_id}: {:#}", e.0);
            }
        })
    }

    async fn start(&self, proposal: Proposal) -> AppResult<()> {
        let game = session::start_session(&self.db_pool, proposal.player_one, proposal.player_two).await?;
        self.live.register(&game).await;
        info!("match {} accepted, game {} is on", proposal.id, game.id);

        let player_one = self.player_ref(game.player_one_id).await?;
        let player_two = self.player_ref(game.player_two_id).await?;
        self.hub.emit_all(&proposal.players(), ServerEvent::MatchStart {
            id: proposal.id,
            game,
            player_one,
            player_two,
        }).await;
        Ok(())
    }

    async fn player_refs(&self, proposal: &Proposal) -> AppResult<(PlayerRef, PlayerRef)> {
        Ok((
            self.player_ref(proposal.player_one).await?,
            self.player_ref(proposal.player_two).await?,
        ))
    }

    async fn player_ref(&self, user_id: Uuid) -> AppResult<PlayerRef> {
        let user = users::find_by_id(&self.db_pool, user_id).await?;
        Ok(PlayerRef { id: user.id, name: user.name })
    }
}
