mod smiles;
pub use smiles::*;

mod smarts;
pub use smarts::*;

mod reaction;
pub use reaction::*;
