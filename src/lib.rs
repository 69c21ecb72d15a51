pub mod render {
    pub use akari_render::*;
}
pub mod dev {
    pub use akari_dev::*;
}
pub mod utils {
    pub use akari_utils::*;
}
