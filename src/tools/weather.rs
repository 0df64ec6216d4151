/// Canned weather report; the demo servers never call a real weather API.
pub fn describe(city: &str) -> String {
    format!("The weather in {city} is sunny with a temperature of 25°C.")
}
