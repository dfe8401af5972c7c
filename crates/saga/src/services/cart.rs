//! Cart lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::CartId;
use domain::Cart;
use parking_lot::RwLock;

use crate::error::SagaError;

/// Read access to completed checkout carts.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<CartId, Cart>,
    unavailable: bool,
}

/// In-memory cart store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cart: Cart) {
        self.state.write().carts.insert(cart.id, cart);
    }

    /// Makes every lookup fail with a transient error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>, SagaError> {
        let state = self.state.read();
        if state.unavailable {
            return Err(SagaError::transient("cart", "cart store unavailable"));
        }
        Ok(state.carts.get(&cart_id).cloned())
    }
}
