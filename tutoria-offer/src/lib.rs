pub mod ledger;
pub mod models;

pub use ledger::OfferLedger;
pub use models::{MyOffer, Offer, OfferStanding, OfferStatus, OfferSubmission, RequestWithOffers, TeacherOfferEntry};
