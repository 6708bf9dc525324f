/// Default number of changes buffered per subscriber before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Settings for an observed database.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
   /// Tables whose changes are captured. More can be added by subscribing.
   pub tables: Vec<String>,
   /// Capacity of the broadcast channel shared by all subscribers.
   pub channel_capacity: usize,
}

impl Default for ObserverConfig {
   fn default() -> Self {
      Self {
         tables: Vec::new(),
         channel_capacity: DEFAULT_CHANNEL_CAPACITY,
      }
   }
}

impl ObserverConfig {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_tables<I, S>(mut self, tables: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.tables.extend(tables.into_iter().map(Into::into));
      self
   }

   pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
      self.channel_capacity = capacity.max(1);
      self
   }
}
