use std::sync::Arc;

use storage::ContentSource;

use crate::{authority::AuthorityHandle, scratch::ScratchSpace};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) authority: AuthorityHandle,
    pub(crate) content: Arc<dyn ContentSource>,
    pub(crate) scratch: Arc<ScratchSpace>,
}
