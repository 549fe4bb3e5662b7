pub use ff;

pub mod batch_reconstruction;
pub mod circuits;
pub mod config;
pub mod dealer;
pub mod executor;
pub mod fields;
pub mod mixins;
pub mod polynomial;
pub mod reed_solomon;
pub mod robust_reconstruction;
pub mod runner;
pub mod share;
pub mod transport;

pub use fields::MpcField;

/// Shamir sharing-based MPC computation context.
pub trait MpcContext {
    /// Field type used by this MPC protocol.
    type Field: MpcField;

    /// Number of parties participating in MPC computation.
    fn num_parties(&self) -> usize;

    /// ID of current party.
    fn party_id(&self) -> usize;

    /// Maximum number of corrupted parties tolerated, i.e. degree of sharing polynomials.
    fn threshold(&self) -> usize;
}
