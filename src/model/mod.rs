mod actor_critic;
mod executor;
mod gru;
pub mod ops;

pub use actor_critic::{create_actor_critic, ActorCritic, PolicyOutput};
pub use executor::{Eager, Executor};
pub use gru::GruCell;
pub use ops::Activation;
