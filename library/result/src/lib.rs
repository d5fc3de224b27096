use error::FleetError;

/// A Result is an alias of [std::result::Result](std::result::Result) with its error variant
/// pre-populated with a `Box<dyn FleetError>`. This allows for shorter
/// notation throughout the codebase.
///
/// For example, instead of writing...
///
/// ```
/// use error::FleetError;
///
/// fn greet() -> Result<&'static str, Box<dyn FleetError>> {
///     Ok("hello")
/// }
/// ```
///
/// ...you can simply say...
///
/// ```
/// use error::FleetError;
/// use result::Result;
///
/// fn greet() -> Result<&'static str> {
///     Ok("hello")
/// }
/// ```
///
/// It also helps in easily identifying if any functions are returning errors
/// BEFORE converting them into workspace native [FleetError](error::FleetError)s.
pub type Result<T> = std::result::Result<T, Box<dyn FleetError>>;
