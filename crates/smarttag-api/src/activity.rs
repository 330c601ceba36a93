// Ride activity endpoints
//
// A student's bus status is derived from their ride history, newest
// first. The portal caps `count` server-side.

use tracing::debug;

use crate::auth::Session;
use crate::client::PortalClient;
use crate::error::Error;
use crate::models::Ride;

/// Rides scanned when looking for the latest one.
const LATEST_RIDE_WINDOW: u32 = 5;

impl PortalClient {
    /// Fetch up to `count` of a student's most recent rides.
    ///
    /// `GET parent/student-activity/{student_id}?count={count}`
    pub async fn list_rides(
        &self,
        session: &Session,
        student_id: &str,
        count: u32,
    ) -> Result<Vec<Ride>, Error> {
        let mut url = self.url(&format!("parent/student-activity/{student_id}"))?;
        url.query_pairs_mut()
            .append_pair("count", &count.to_string());
        debug!(student_id, count, "listing rides");
        self.get(session, url).await
    }

    /// The single most recent ride, if the student has any.
    ///
    /// Sorted locally: the portal does not document its ordering.
    pub async fn latest_ride(
        &self,
        session: &Session,
        student_id: &str,
    ) -> Result<Option<Ride>, Error> {
        let rides = self
            .list_rides(session, student_id, LATEST_RIDE_WINDOW)
            .await?;
        Ok(rides.into_iter().max_by_key(|r| r.embarked_at))
    }
}
