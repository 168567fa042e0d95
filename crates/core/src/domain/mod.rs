pub mod client;
pub mod devis;
pub mod dossier;
pub mod facture;
pub mod fiche;
pub mod rdv;
pub mod relance;
pub mod tenant;
