pub mod booking;
pub mod seat;
pub mod show;
pub mod user;

pub use booking::{Booking, BookingStatus};
pub use seat::{Seat, SeatCategory, SeatStatus};
pub use show::Show;
pub use user::User;
