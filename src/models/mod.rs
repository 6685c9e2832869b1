pub mod audit;
pub mod booking;
pub mod flight_leg;
pub mod hotel_rate;
pub mod package;

pub use audit::{AuditAction, AuditRecord, RequestContext};
pub use booking::{
    Booking, BookingPatch, BookingStatus, ExcursionBooking, ExcursionRequest, FlightBooking,
    HotelBooking, NewBooking, Occupancy, PaymentMeta, TransferBooking, Transition,
};
pub use flight_leg::FlightLeg;
pub use hotel_rate::{select_rate, HotelRate};
pub use package::{PackageConfig, PackagePriceQuote};
