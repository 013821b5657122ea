use std::{
	collections::HashMap,
	mem,
	sync::{Arc, Mutex, MutexGuard},
};

use dossier_service::{ConversationHistory, DossierService};
use dossier_storage::MemoryEngine;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<DossierService>,
	sessions: Arc<Mutex<HashMap<String, Session>>>,
}
impl AppState {
	pub fn new(config: dossier_config::Config) -> color_eyre::Result<Self> {
		let engine = match config.corpus.as_ref() {
			Some(corpus) => MemoryEngine::open(&corpus.path)?,
			None => {
				tracing::warn!("No corpus configured. Serving an empty catalog.");

				MemoryEngine::default()
			},
		};

		Ok(Self::with_service(DossierService::new(config, Arc::new(engine))))
	}

	pub fn with_service(service: DossierService) -> Self {
		Self { service: Arc::new(service), sessions: Default::default() }
	}

	/// Checks a history out for one turn. New ids start empty.
	pub fn checkout(&self, session_id: &str) -> Result<SessionCheckout, SessionBusy> {
		let mut sessions = self.lock();
		let prior = match sessions.insert(session_id.to_string(), Session::Busy) {
			Some(Session::Busy) => return Err(SessionBusy),
			Some(Session::Idle(history)) => Some(history),
			None => None,
		};

		Ok(SessionCheckout {
			state: self.clone(),
			session_id: session_id.to_string(),
			history: prior.clone().unwrap_or_default(),
			prior,
			committed: false,
		})
	}

	/// `Ok(None)` for unknown sessions.
	pub fn history(&self, session_id: &str) -> Result<Option<ConversationHistory>, SessionBusy> {
		match self.lock().get(session_id) {
			Some(Session::Idle(history)) => Ok(Some(history.clone())),
			Some(Session::Busy) => Err(SessionBusy),
			None => Ok(None),
		}
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
		self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[derive(Debug)]
pub struct SessionBusy;

/// A session held for one turn. Dropping it without [`SessionCheckout::commit`] restores the
/// history the turn started from.
pub struct SessionCheckout {
	state: AppState,
	session_id: String,
	prior: Option<ConversationHistory>,
	history: ConversationHistory,
	committed: bool,
}
impl SessionCheckout {
	pub fn history_mut(&mut self) -> &mut ConversationHistory {
		&mut self.history
	}

	pub fn commit(mut self) {
		let history = mem::take(&mut self.history);

		self.state.lock().insert(self.session_id.clone(), Session::Idle(history));
		self.committed = true;
	}
}

impl Drop for SessionCheckout {
	fn drop(&mut self) {
		if self.committed {
			return;
		}

		let mut sessions = self.state.lock();

		match self.prior.take() {
			Some(history) => {
				sessions.insert(self.session_id.clone(), Session::Idle(history));
			},
			None => {
				sessions.remove(&self.session_id);
			},
		}

		tracing::warn!(session_id = %self.session_id, "Turn abandoned. Session history restored.");
	}
}

enum Session {
	Idle(ConversationHistory),
	/// A turn is in flight.
	Busy,
}
