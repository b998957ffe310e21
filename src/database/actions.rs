mod catalog;
#[cfg(test)]
mod fixtures;
mod follows;
mod recipes;
mod relations;
mod shopping_list;
mod short_links;
mod users;
mod views;

pub use catalog::*;
pub use follows::*;
pub use recipes::*;
pub use relations::*;
pub use shopping_list::*;
pub use short_links::*;
pub use users::*;
pub use views::*;
