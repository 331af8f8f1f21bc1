/// @operationId currentUser
pub fn get(user: AuthUser<"admin">, trace: Header<"X-Trace">) -> String {}
