#[rocket::launch]
fn rocket() -> _ {
    let rocket = roster_api::rocket();
    log::info!("Starting Roster API server");
    rocket
}
