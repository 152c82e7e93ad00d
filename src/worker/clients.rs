use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

/// A page (window) the worker may control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: Uuid,
    pub url: String,
    pub controlled: bool,
    pub focused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Focused(Uuid),
    Opened(Uuid),
}

/// The pages the worker can see. `register` records a page once per URL,
/// `claim` takes control of every page at once and `focus_or_open` backs
/// notification clicks.
pub trait Clients: Send + Sync {
    fn register(&self, url: &str, controlled: bool) -> Uuid;
    fn claim(&self) -> usize;
    fn focus_or_open(&self, url: &str) -> WindowAction;
    fn match_all(&self) -> Vec<ClientInfo>;
}

/// In-process client list.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<Vec<ClientInfo>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clients for ClientRegistry {
    /// A page loaded while the worker is active starts out controlled; one
    /// seen earlier stays uncontrolled until `claim`.
    fn register(&self, url: &str, controlled: bool) -> Uuid {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.iter_mut().find(|client| client.url == url) {
            client.controlled |= controlled;
            return client.id;
        }
        let id = Uuid::new_v4();
        clients.push(ClientInfo {
            id,
            url: url.to_string(),
            controlled,
            focused: false,
        });
        id
    }

    fn claim(&self) -> usize {
        let mut clients = self.clients.lock();
        for client in clients.iter_mut() {
            client.controlled = true;
        }
        clients.len()
    }

    fn focus_or_open(&self, url: &str) -> WindowAction {
        let mut clients = self.clients.lock();
        let existing = clients.iter().position(|client| client.url == url);
        for client in clients.iter_mut() {
            client.focused = false;
        }
        match existing {
            Some(index) => {
                clients[index].focused = true;
                WindowAction::Focused(clients[index].id)
            }
            None => {
                let id = Uuid::new_v4();
                clients.push(ClientInfo {
                    id,
                    url: url.to_string(),
                    controlled: true,
                    focused: true,
                });
                WindowAction::Opened(id)
            }
        }
    }

    fn match_all(&self) -> Vec<ClientInfo> {
        self.clients.lock().clone()
    }
}
