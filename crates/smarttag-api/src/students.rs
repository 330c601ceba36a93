// Student roster endpoint

use tracing::debug;

use crate::auth::Session;
use crate::client::PortalClient;
use crate::error::Error;
use crate::models::PortalStudent;

impl PortalClient {
    /// List every student linked to the parent account.
    ///
    /// `GET parent/all-students`
    pub async fn list_students(&self, session: &Session) -> Result<Vec<PortalStudent>, Error> {
        let url = self.url("parent/all-students")?;
        debug!("listing students");
        self.get(session, url).await
    }
}
